//! High-level API for Arbor.
//!
//! Arbor persists an in-memory object tree against an on-disk document
//! without requiring the document to fully describe the tree. Loading does
//! not reconstruct objects: it updates an already-instantiated tree in
//! place, so fields the document does not know survive, stale document
//! keys are dropped, and type mismatches degrade gracefully. Large tensors
//! leave the document for a sibling array store and can be memory-mapped
//! back.
//!
//! Types opt in by implementing [`Composite`] (a static, auditable field
//! list) plus `Clone`, then invoking [`composite_node!`]; dynamically
//! shaped data uses [`Bundle`] and [`List`]. Loadable-from-scratch types
//! register a zero-argument factory in a [`TypeRegistry`].
//!
//! Entry points: [`save`] / [`load`] for the common case, [`StateDir`]
//! when you need your own registry or [`Options`],
//! [`serialize_to_string`] / [`load_from_string`] for the string
//! transport, and [`merge`] to reconcile two live trees directly.

use std::path::Path;

pub use arbor_codec::{doc, Key, Loader, Options, Outcome, Serializer};
pub use arbor_merge::merge;
pub use arbor_persist::{
    load_from_string, serialize_to_string, DocLock, PersistError, PersistResult, StateDir,
    EXTERN_DIR, STATE_FILE,
};
pub use arbor_store::{ArrayStore, Codec, DirArrayStore, InMemoryArrayStore, StoreError};
pub use arbor_tree::{
    composite_node, get_path, get_path_mut, set_path, Backing, Bundle, Composite, DType, Elem,
    Element, List, Node, NodeKind, Scalar, Sequence, StateMap, Step, Tensor, TreeError, TreePath,
    TypeRegistry,
};

/// Save `tree` into `dir` with default options and the built-in registry.
pub fn save(tree: &mut dyn Node, dir: impl AsRef<Path>) -> PersistResult<()> {
    StateDir::open(dir, TypeRegistry::new(), Options::default())?.save(tree)
}

/// Update `tree` in place from `dir` with default options and the built-in
/// registry. Returns `Ok(false)` when nothing has been saved there yet.
pub fn load(tree: &mut dyn Node, dir: impl AsRef<Path>) -> PersistResult<bool> {
    StateDir::open(dir, TypeRegistry::new(), Options::default())?.load(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Debug, PartialEq)]
    struct Sensor {
        offset: f64,
        samples: Tensor,
        labels: Vec<String>,
        _scratch: i64,
    }

    impl Default for Sensor {
        fn default() -> Self {
            Self {
                offset: 0.0,
                samples: Tensor::zeros(DType::F64, &[0]),
                labels: Vec::new(),
                _scratch: 0,
            }
        }
    }

    impl Composite for Sensor {
        fn field_names(&self) -> Vec<String> {
            vec![
                "offset".into(),
                "samples".into(),
                "labels".into(),
                "_scratch".into(),
            ]
        }
        fn field(&self, name: &str) -> Option<&dyn Node> {
            match name {
                "offset" => Some(&self.offset),
                "samples" => Some(&self.samples),
                "labels" => Some(&self.labels),
                "_scratch" => Some(&self._scratch),
                _ => None,
            }
        }
        fn field_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
            match name {
                "offset" => Some(&mut self.offset),
                "samples" => Some(&mut self.samples),
                "labels" => Some(&mut self.labels),
                "_scratch" => Some(&mut self._scratch),
                _ => None,
            }
        }
    }

    composite_node!(Sensor, "rig.Sensor");

    #[derive(Clone, Debug, PartialEq, Default)]
    struct Rig {
        name: String,
        sensors: Vec<Sensor>,
    }

    impl Composite for Rig {
        fn field_names(&self) -> Vec<String> {
            vec!["name".into(), "sensors".into()]
        }
        fn field(&self, name: &str) -> Option<&dyn Node> {
            match name {
                "name" => Some(&self.name),
                "sensors" => Some(&self.sensors),
                _ => None,
            }
        }
        fn field_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
            match name {
                "name" => Some(&mut self.name),
                "sensors" => Some(&mut self.sensors),
                _ => None,
            }
        }
    }

    composite_node!(Rig, "rig.Rig");

    fn sample_rig() -> Rig {
        Rig {
            name: "bench-1".into(),
            sensors: vec![
                Sensor {
                    offset: 0.25,
                    samples: Tensor::from_slice(&[2, 20], &[1.5f64; 40]).unwrap(),
                    labels: vec!["a".into(), "b".into()],
                    _scratch: 7,
                },
                Sensor {
                    offset: -1.0,
                    samples: Tensor::from_slice(&[4], &[9.0f64; 4]).unwrap(),
                    labels: vec![],
                    _scratch: 0,
                },
            ],
        }
    }

    #[test]
    fn full_roundtrip_preserves_fields_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut rig = sample_rig();
        save(&mut rig, dir.path()).unwrap();

        let mut fresh = Rig::default();
        fresh.sensors.push(Sensor::default());
        fresh.sensors[0]._scratch = 42;
        assert!(load(&mut fresh, dir.path()).unwrap());

        assert_eq!(fresh.name, "bench-1");
        assert_eq!(fresh.sensors.len(), 2);
        assert_eq!(fresh.sensors[0].offset, 0.25);
        assert_eq!(fresh.sensors[0].labels, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(fresh.sensors[0].samples, sample_rig().sensors[0].samples);
        assert_eq!(fresh.sensors[1].offset, -1.0);
        // Private fields never hit the document, so the live value stays.
        assert_eq!(fresh.sensors[0]._scratch, 42);
    }

    #[test]
    fn threshold_boundary_roundtrips_both_ways() {
        let dir = tempfile::tempdir().unwrap();

        let mut tree = Bundle::new();
        tree.insert("inline", Tensor::from_slice(&[25], &[3.0f64; 25]).unwrap());
        tree.insert("external", Tensor::from_slice(&[26], &[4.0f64; 26]).unwrap());
        save(&mut tree, dir.path()).unwrap();

        let text =
            std::fs::read_to_string(dir.path().join(STATE_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["inline"]["__class__"], serde_json::json!("arbor.Tensor"));
        assert_eq!(doc["external"]["__class__"], serde_json::json!("__extern__"));

        let mut fresh = Bundle::new();
        fresh.insert("inline", Tensor::zeros(DType::F64, &[1]));
        fresh.insert("external", Tensor::zeros(DType::F64, &[1]));
        load(&mut fresh, dir.path()).unwrap();
        assert_eq!(
            fresh.get("inline").unwrap().as_tensor().unwrap().to_vec::<f64>().unwrap(),
            vec![3.0; 25]
        );
        assert_eq!(
            fresh.get("external").unwrap().as_tensor().unwrap().to_vec::<f64>().unwrap(),
            vec![4.0; 26]
        );
    }

    #[test]
    fn unknown_fields_tolerated_in_both_directions() {
        let dir = tempfile::tempdir().unwrap();

        // The document knows a field the live tree dropped, and the live
        // tree has a field the document never saw.
        let mut old = Bundle::new();
        old.insert("kept", 1i64);
        old.insert("removed_later", "stale".to_string());
        save(&mut old, dir.path()).unwrap();

        #[derive(Clone, Default)]
        struct Evolved {
            kept: i64,
            added_later: f64,
        }
        impl Composite for Evolved {
            fn field_names(&self) -> Vec<String> {
                vec!["kept".into(), "added_later".into()]
            }
            fn field(&self, name: &str) -> Option<&dyn Node> {
                match name {
                    "kept" => Some(&self.kept),
                    "added_later" => Some(&self.added_later),
                    _ => None,
                }
            }
            fn field_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
                match name {
                    "kept" => Some(&mut self.kept),
                    "added_later" => Some(&mut self.added_later),
                    _ => None,
                }
            }
        }
        composite_node!(Evolved, "rig.Evolved");

        let mut evolved = Evolved {
            kept: 0,
            added_later: 6.5,
        };
        assert!(load(&mut evolved, dir.path()).unwrap());
        assert_eq!(evolved.kept, 1);
        assert_eq!(evolved.added_later, 6.5);
    }

    #[test]
    fn shape_mismatch_grows_sequence_to_document_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = Bundle::new();
        tree.insert("xs", vec![10i64, 20, 30, 40, 50]);
        save(&mut tree, dir.path()).unwrap();

        let mut fresh = Bundle::new();
        fresh.insert("xs", vec![1i64, 2]);
        load(&mut fresh, dir.path()).unwrap();

        let xs = fresh.get("xs").unwrap().as_sequence().unwrap();
        assert_eq!(xs.len(), 5);
        let collected: Vec<i64> = (0..5)
            .map(|i| match xs.get(i).unwrap().as_scalar().unwrap() {
                Scalar::Int(v) => v,
                other => panic!("expected int, got {other:?}"),
            })
            .collect();
        assert_eq!(collected, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn dynamic_reconstruction_into_null_counterpart() {
        let dir = tempfile::tempdir().unwrap();

        let mut registry = TypeRegistry::new();
        registry.register_default::<Sensor>("rig.Sensor");
        let state = StateDir::open(dir.path(), registry, Options::default()).unwrap();

        // A list of sensors saved from one process...
        let mut tree = Bundle::new();
        let mut sensors = List::new();
        sensors.push_value(Sensor {
            offset: 2.0,
            samples: Tensor::from_slice(&[3], &[1.0f64, 2.0, 3.0]).unwrap(),
            labels: vec!["x".into()],
            _scratch: 0,
        });
        tree.insert("sensors", sensors);
        state.save(&mut tree).unwrap();

        // ...reconstructed from nothing in another: the live list is empty,
        // so every entry is built through the registry.
        let mut fresh = Bundle::new();
        fresh.insert("sensors", List::new());
        state.load(&mut fresh).unwrap();

        let sensors = fresh.get("sensors").unwrap().as_sequence().unwrap();
        assert_eq!(sensors.len(), 1);
        let sensor = sensors
            .get(0)
            .unwrap()
            .as_any()
            .downcast_ref::<Sensor>()
            .expect("registry constructed the concrete type");
        assert_eq!(sensor.offset, 2.0);
        assert_eq!(sensor.labels, vec!["x".to_string()]);
    }

    #[test]
    fn merge_syncs_without_disk_and_is_idempotent() {
        let dst = sample_rig();
        let mut src = sample_rig();
        src.name = "bench-2".into();
        src.sensors[0].offset = 9.75;
        src.sensors.push(Sensor {
            offset: 5.0,
            samples: Tensor::zeros(DType::F64, &[2]),
            labels: vec!["new".into()],
            _scratch: 1,
        });

        let mut once = dst.clone();
        merge(&mut once, &src);
        assert_eq!(once.name, "bench-2");
        assert_eq!(once.sensors.len(), 3);
        assert_eq!(once.sensors[0].offset, 9.75);

        let mut twice = dst.clone();
        merge(&mut twice, &src);
        merge(&mut twice, &src);
        assert_eq!(once, twice);
    }

    #[test]
    fn string_transport_matches_directory_semantics() {
        let mut rig = sample_rig();
        let text = serialize_to_string(&mut rig, &Options::default()).unwrap();
        assert!(!text.contains("__extern__"), "strings never externalize");

        let mut fresh = Rig::default();
        fresh.sensors.push(Sensor::default());
        fresh.sensors.push(Sensor::default());
        load_from_string(&mut fresh, &text, &TypeRegistry::new(), &Options::default()).unwrap();
        assert_eq!(fresh.name, "bench-1");
        assert_eq!(fresh.sensors[0].samples, rig.sensors[0].samples);
    }

    #[test]
    fn concurrent_saves_serialize_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(
            StateDir::open(dir.path(), TypeRegistry::new(), Options::default()).unwrap(),
        );

        // Seed so both contenders go through the lock path.
        let mut seed = Bundle::new();
        seed.insert("writer", 0i64);
        state.save(&mut seed).unwrap();

        let handles: Vec<_> = (1..=2)
            .map(|writer| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    let mut tree = Bundle::new();
                    tree.insert("writer", writer as i64);
                    tree.insert("payload", vec![writer as i64; 64]);
                    state.save(&mut tree).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("saver should not panic");
        }

        // The document is exactly one of the two writes, never a blend.
        let text = std::fs::read_to_string(dir.path().join(STATE_FILE)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        let writer = doc["writer"].as_i64().unwrap();
        assert!(writer == 1 || writer == 2);
        let payload: Vec<i64> = doc["payload"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert_eq!(payload, vec![writer; 64]);
    }

    #[test]
    fn path_accessor_reaches_into_saved_tree() {
        let rig = sample_rig();
        let value = get_path(&rig, &TreePath::parse("/sensors/0/labels/1")).unwrap();
        assert_eq!(value.as_scalar(), Some(Scalar::Str("b".into())));

        let mut rig = rig;
        assert!(set_path(
            &mut rig,
            &TreePath::parse("/sensors/1/offset"),
            Box::new(3.5f64)
        ));
        assert_eq!(rig.sensors[1].offset, 3.5);
    }
}
