//! String transport.
//!
//! The same document grammar, carried as a string instead of a directory:
//! no locking, no array store, externalization forced off so every tensor
//! inlines.

use serde_json::Value;

use arbor_codec::{Key, Loader, Options, Serializer};
use arbor_tree::{Node, TypeRegistry};

use crate::error::{PersistError, PersistResult};

/// Serialize `tree` to a document string with all tensors inlined.
pub fn serialize_to_string(tree: &mut dyn Node, options: &Options) -> PersistResult<String> {
    let options = Options {
        externalize_arrays: false,
        ..options.clone()
    };
    let mut serializer = Serializer::new(None, &options);
    let doc = serializer
        .serialize(tree, Key::Root)?
        .ok_or(PersistError::NothingToSave)?;
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Reconcile `tree` from a document string produced by
/// [`serialize_to_string`] (or a compatible document).
pub fn load_from_string(
    tree: &mut dyn Node,
    text: &str,
    registry: &TypeRegistry,
    options: &Options,
) -> PersistResult<()> {
    let doc: Value = serde_json::from_str(text)?;
    let options = Options {
        externalize_arrays: false,
        ..options.clone()
    };
    let mut loader = Loader::new(None, registry, &options);
    loader.load(Some(tree), &doc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_tree::{Bundle, DType, Scalar, Tensor};

    #[test]
    fn string_roundtrip_inlines_tensors() {
        let mut tree = Bundle::new();
        tree.insert("name", "probe".to_string());
        // Above the externalization threshold, but strings always inline.
        tree.insert("wave", Tensor::from_slice(&[40], &[0.5f32; 40]).unwrap());

        let text = serialize_to_string(&mut tree, &Options::default()).unwrap();
        assert!(text.contains("\"dtype\""));
        assert!(!text.contains("__extern__"));

        let mut fresh = Bundle::new();
        fresh.insert("name", String::new());
        fresh.insert("wave", Tensor::zeros(DType::F32, &[1]));
        load_from_string(&mut fresh, &text, &TypeRegistry::new(), &Options::default()).unwrap();

        assert_eq!(
            fresh.get("name").unwrap().as_scalar(),
            Some(Scalar::Str("probe".into()))
        );
        assert_eq!(
            fresh.get("wave").unwrap().as_tensor().unwrap(),
            tree.get("wave").unwrap().as_tensor().unwrap()
        );
    }

    #[test]
    fn empty_tree_has_nothing_to_serialize() {
        let mut tree = Bundle::new();
        let err = serialize_to_string(&mut tree, &Options::default()).unwrap_err();
        assert!(matches!(err, PersistError::NothingToSave));
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let mut tree = Bundle::new();
        tree.insert("x", 1i64);
        let err = load_from_string(
            &mut tree,
            "not json",
            &TypeRegistry::new(),
            &Options::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PersistError::Json(_)));
    }
}
