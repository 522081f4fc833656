//! Document → live tree reconciliation.
//!
//! Loading never rebuilds a tree from scratch: it walks the document
//! alongside the already-instantiated live value and updates matching parts
//! in place. Fields the document does not know keep their live values,
//! fields the live tree does not know are dropped, and type mismatches
//! degrade to coercion or a no-op. A subtree is only constructed fresh when
//! there is no live counterpart at all, via the type registry.
//!
//! Every fault inside the walk is recovered locally: a malformed subtree
//! is skipped with a diagnostic, never an error for the whole load.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::warn;

use arbor_store::ArrayStore;
use arbor_tree::{
    Backing, Bundle, Composite, List, Node, Sequence, StateMap, Tensor, TreePath, TypeRegistry,
};

use crate::doc::{self, CLASS_KEY, EXTERN_TAG};
use crate::options::Options;

/// What became of one reconciliation step.
pub enum Outcome {
    /// The live value was updated (or deliberately left) in place.
    Kept,
    /// A value built fresh; the parent decides where it lands.
    Fresh(Box<dyn Node>),
    /// Nothing usable; the entry is omitted from its parent.
    Skip,
}

/// Walks a document alongside a live tree.
pub struct Loader<'a> {
    store: Option<&'a dyn ArrayStore>,
    registry: &'a TypeRegistry,
    options: &'a Options,
    path: TreePath,
    touched: BTreeSet<String>,
}

impl<'a> Loader<'a> {
    /// A loader resolving external references through `store`. Pass `None`
    /// for the string transport (references then resolve to nothing).
    pub fn new(
        store: Option<&'a dyn ArrayStore>,
        registry: &'a TypeRegistry,
        options: &'a Options,
    ) -> Self {
        Self {
            store,
            registry,
            options,
            path: TreePath::root(),
            touched: BTreeSet::new(),
        }
    }

    /// Store keys resolved during this pass.
    pub fn touched(&self) -> &BTreeSet<String> {
        &self.touched
    }

    pub fn into_touched(self) -> BTreeSet<String> {
        self.touched
    }

    /// Reconcile `doc` into `live`. With no live counterpart the value is
    /// built fresh and returned as [`Outcome::Fresh`].
    pub fn load(&mut self, live: Option<&mut dyn Node>, doc: &Value) -> Outcome {
        // Reserved tags first: both resolve to a live tensor before the
        // ordinary dispatch runs.
        if let Some(tag) = doc::type_tag(doc) {
            if tag == EXTERN_TAG {
                return self.load_extern(live, doc);
            }
            if tag == arbor_tree::TENSOR_TYPE {
                return match doc::tensor_from_doc(doc) {
                    Some(tensor) => adopt_tensor(live, tensor),
                    None => {
                        warn!(path = %self.path, "malformed inline tensor; skipping");
                        kept_or_skip(live)
                    }
                };
            }
        }

        match live {
            Some(node) => {
                if node.as_composite().is_some() {
                    if let Value::Object(map) = doc {
                        return self.load_composite(node, map);
                    }
                    return Outcome::Kept;
                }
                if node.as_sequence().is_some() {
                    if let Value::Array(items) = doc {
                        return self.load_sequence(node, items);
                    }
                    return Outcome::Kept;
                }
                if node.as_scalar().is_some() {
                    if let Some(scalar) = doc::value_to_scalar(doc) {
                        // Adopt on type match, coerce otherwise; a failed
                        // coercion leaves the live value as it was.
                        node.set_scalar(&scalar);
                    }
                    return Outcome::Kept;
                }
                // Tensor counterpart with a non-tensor document, opaque
                // values: nothing more we can do.
                Outcome::Kept
            }
            None => self.load_fresh(doc),
        }
    }

    fn load_extern(&mut self, live: Option<&mut dyn Node>, doc: &Value) -> Outcome {
        let Some(key) = doc::extern_path(doc) else {
            warn!(path = %self.path, "external reference without a path; skipping");
            return kept_or_skip(live);
        };
        let Some(store) = self.store else {
            warn!(path = %self.path, key, "no array store attached; skipping external reference");
            return kept_or_skip(live);
        };

        let read = if self.options.mmap_arrays {
            store.read_mapped(key)
        } else {
            store.read(key)
        };
        match read {
            Ok(Some(mut tensor)) => {
                tensor.set_backing(Some(Backing {
                    store: store.store_id().to_string(),
                    key: key.to_string(),
                }));
                self.touched.insert(key.to_string());
                adopt_tensor(live, tensor)
            }
            Ok(None) => {
                warn!(path = %self.path, key, "external array missing; keeping live value");
                kept_or_skip(live)
            }
            Err(e) => {
                warn!(path = %self.path, key, error = %e, "external array unreadable; keeping live value");
                kept_or_skip(live)
            }
        }
    }

    fn load_composite(&mut self, node: &mut dyn Node, map: &Map<String, Value>) -> Outcome {
        let comp = node.as_composite_mut().expect("checked composite");

        if comp.has_load_hook() {
            // The whole decoded mapping goes to the hook in one call.
            let mut state = StateMap::new();
            for (key, value) in map {
                if key == CLASS_KEY {
                    continue;
                }
                self.path.push_key(key);
                let out = self.load(None, value);
                self.path.pop();
                if let Outcome::Fresh(fresh) = out {
                    state.insert(key.clone(), fresh);
                }
            }
            comp.load_state(state);
            return Outcome::Kept;
        }

        if comp.accepts_new_keys() {
            // An empty mapping accepts whatever the document stored.
            for (key, value) in map {
                if key == CLASS_KEY {
                    continue;
                }
                self.path.push_key(key);
                let out = self.load(None, value);
                self.path.pop();
                if let Outcome::Fresh(fresh) = out {
                    comp.insert_field(key, fresh);
                }
            }
            return Outcome::Kept;
        }

        // Only keys present on both sides apply; unknown document keys are
        // dropped, missing ones leave the live field untouched.
        for name in comp.field_names() {
            let Some(value) = map.get(&name) else {
                continue;
            };
            self.path.push_key(&name);
            let out = {
                let Some(child) = comp.field_mut(&name) else {
                    self.path.pop();
                    continue;
                };
                self.load(Some(child), value)
            };
            self.path.pop();
            if let Outcome::Fresh(fresh) = out {
                comp.set_field(&name, fresh);
            }
        }
        Outcome::Kept
    }

    fn load_sequence(&mut self, node: &mut dyn Node, items: &[Value]) -> Outcome {
        let seq = node.as_sequence_mut().expect("checked sequence");
        let live_len = seq.len();

        for (i, value) in items.iter().enumerate() {
            self.path.push_index(i);
            if i < live_len {
                // Reconcile into the existing entry.
                if let Some(child) = seq.get_mut(i) {
                    self.load(Some(child), value);
                }
            } else if let Some(mut fresh) = seq.new_element() {
                // Typed sequence: grow with a default element and reconcile
                // the document entry into it.
                self.load(Some(fresh.as_mut()), value);
                seq.push(fresh);
            } else {
                // Dynamic sequence: build the element from the document.
                match self.load(None, value) {
                    Outcome::Fresh(fresh) => {
                        seq.push(fresh);
                    }
                    // Skipped entries are omitted from the result.
                    _ => {}
                }
            }
            self.path.pop();
        }
        // Live entries past the document length are kept as they are.
        Outcome::Kept
    }

    fn load_fresh(&mut self, doc: &Value) -> Outcome {
        match doc {
            Value::Object(map) => {
                if let Some(tag) = doc::type_tag(doc) {
                    match self.registry.construct(tag) {
                        Some(mut node) => {
                            self.load(Some(node.as_mut()), doc);
                            Outcome::Fresh(node)
                        }
                        None => {
                            warn!(path = %self.path, ty = tag, "unknown type; skipping subtree");
                            Outcome::Skip
                        }
                    }
                } else {
                    // Untagged objects decode into a dynamic bundle.
                    let mut bundle = Bundle::new();
                    for (key, value) in map {
                        self.path.push_key(key);
                        let out = self.load(None, value);
                        self.path.pop();
                        if let Outcome::Fresh(fresh) = out {
                            Composite::insert_field(&mut bundle, key, fresh);
                        }
                    }
                    Outcome::Fresh(Box::new(bundle))
                }
            }
            Value::Array(items) => {
                let mut list = List::new();
                for (i, value) in items.iter().enumerate() {
                    self.path.push_index(i);
                    let out = self.load(None, value);
                    self.path.pop();
                    if let Outcome::Fresh(fresh) = out {
                        Sequence::push(&mut list, fresh);
                    }
                }
                Outcome::Fresh(Box::new(list))
            }
            primitive => match doc::value_to_scalar(primitive) {
                // The document's primitive value, adopted verbatim.
                Some(scalar) => Outcome::Fresh(Box::new(scalar)),
                None => Outcome::Skip,
            },
        }
    }
}

fn kept_or_skip(live: Option<&mut dyn Node>) -> Outcome {
    match live {
        Some(_) => Outcome::Kept,
        None => Outcome::Skip,
    }
}

fn adopt_tensor(live: Option<&mut dyn Node>, tensor: Tensor) -> Outcome {
    match live {
        Some(node) => {
            if let Some(slot) = node.as_tensor_mut() {
                *slot = tensor;
            }
            // A non-tensor counterpart is left unchanged.
            Outcome::Kept
        }
        None => Outcome::Fresh(Box::new(tensor)),
    }
}
