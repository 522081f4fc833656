//! Built-in container nodes.
//!
//! [`List`] and [`Bundle`] are the dynamic containers: their slots hold
//! `Box<dyn Node>` and adopt whatever shape a document provides. Plain
//! `Vec<T>` and `BTreeMap<String, T>` also implement the capabilities, so
//! statically typed fields participate without wrappers; their elements stay
//! typed and fresh entries start from `T::default()`.

use std::collections::BTreeMap;

use crate::composite_node;
use crate::node::{node_common, Composite, Node, NodeKind, Sequence};

/// Canonical type-tag for mapping-like composites.
pub const BUNDLE_TYPE: &str = "arbor.Bundle";

/// Canonical name for the dynamic sequence (registry use only; sequences
/// never carry a document type-tag).
pub const LIST_TYPE: &str = "arbor.List";

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Dynamic ordered container; the live counterpart of a document array when
/// no typed sequence exists.
#[derive(Clone, Debug, Default)]
pub struct List {
    items: Vec<Box<dyn Node>>,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a concrete value.
    pub fn push_value<T: Node>(&mut self, value: T) {
        self.items.push(Box::new(value));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Node> {
        self.items.get(index).map(|b| b.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Node> {
        self.items.iter().map(|b| b.as_ref())
    }
}

impl Sequence for List {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<&dyn Node> {
        self.items.get(index).map(|b| b.as_ref())
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Node> {
        self.items.get_mut(index).map(|b| b.as_mut())
    }

    fn push(&mut self, value: Box<dyn Node>) -> bool {
        self.items.push(value);
        true
    }

    fn set_item(&mut self, index: usize, value: Box<dyn Node>) -> bool {
        match self.items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.items.remove(index);
            true
        } else {
            false
        }
    }

    fn new_element(&self) -> Option<Box<dyn Node>> {
        None
    }
}

impl Node for List {
    fn type_name(&self) -> &str {
        LIST_TYPE
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Sequence
    }
    node_common!();

    fn as_sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }
    fn as_sequence_mut(&mut self) -> Option<&mut dyn Sequence> {
        Some(self)
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Dynamic mapping with string keys; the live counterpart of a tag-less
/// document object. An empty bundle accepts every document key verbatim.
#[derive(Clone, Debug, Default)]
pub struct Bundle {
    entries: BTreeMap<String, Box<dyn Node>>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a concrete value under `key`, replacing any previous entry.
    pub fn insert<T: Node>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    pub fn get(&self, key: &str) -> Option<&dyn Node> {
        self.entries.get(key).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut dyn Node> {
        self.entries.get_mut(key).map(|b| b.as_mut())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}

impl Composite for Bundle {
    fn field_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn field(&self, name: &str) -> Option<&dyn Node> {
        self.entries.get(name).map(|b| b.as_ref())
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
        self.entries.get_mut(name).map(|b| b.as_mut())
    }

    // Slots are dynamic: replacement never cares about the previous type.
    fn set_field(&mut self, name: &str, value: Box<dyn Node>) -> bool {
        match self.entries.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn accepts_new_keys(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert_field(&mut self, name: &str, value: Box<dyn Node>) -> bool {
        self.entries.insert(name.to_string(), value);
        true
    }
}

composite_node!(Bundle, "arbor.Bundle");

// ---------------------------------------------------------------------------
// Typed containers
// ---------------------------------------------------------------------------

impl<T: Node + Default + Clone> Sequence for Vec<T> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn get(&self, index: usize) -> Option<&dyn Node> {
        self.as_slice().get(index).map(|v| v as &dyn Node)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Node> {
        self.as_mut_slice().get_mut(index).map(|v| v as &mut dyn Node)
    }

    fn push(&mut self, value: Box<dyn Node>) -> bool {
        match value.into_any().downcast::<T>() {
            Ok(v) => {
                Vec::push(self, *v);
                true
            }
            Err(_) => false,
        }
    }

    fn set_item(&mut self, index: usize, value: Box<dyn Node>) -> bool {
        if index >= self.as_slice().len() {
            return false;
        }
        match value.into_any().downcast::<T>() {
            Ok(v) => {
                self[index] = *v;
                true
            }
            Err(_) => false,
        }
    }

    fn remove(&mut self, index: usize) -> bool {
        if index < self.as_slice().len() {
            Vec::remove(self, index);
            true
        } else {
            false
        }
    }

    fn new_element(&self) -> Option<Box<dyn Node>> {
        Some(Box::new(T::default()))
    }
}

impl<T: Node + Default + Clone> Node for Vec<T> {
    fn type_name(&self) -> &str {
        LIST_TYPE
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Sequence
    }
    node_common!();

    fn as_sequence(&self) -> Option<&dyn Sequence> {
        Some(self)
    }
    fn as_sequence_mut(&mut self) -> Option<&mut dyn Sequence> {
        Some(self)
    }
}

impl<T: Node + Default + Clone> Composite for BTreeMap<String, T> {
    fn field_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn field(&self, name: &str) -> Option<&dyn Node> {
        self.get(name).map(|v| v as &dyn Node)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn Node> {
        self.get_mut(name).map(|v| v as &mut dyn Node)
    }

    fn accepts_new_keys(&self) -> bool {
        self.is_empty()
    }

    fn insert_field(&mut self, name: &str, value: Box<dyn Node>) -> bool {
        match value.into_any().downcast::<T>() {
            Ok(v) => {
                self.insert(name.to_string(), *v);
                true
            }
            Err(value) => {
                // Dynamic decode products (a boxed Scalar) still land in a
                // typed map when the element type can adopt them.
                let scalar = match value.downcast::<crate::Scalar>() {
                    Ok(s) => *s,
                    Err(_) => return false,
                };
                let mut slot = T::default();
                if slot.set_scalar(&scalar) {
                    self.insert(name.to_string(), slot);
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl<T: Node + Default + Clone> Node for BTreeMap<String, T> {
    fn type_name(&self) -> &str {
        BUNDLE_TYPE
    }
    fn kind(&self) -> NodeKind {
        NodeKind::Composite
    }
    node_common!();

    fn as_composite(&self) -> Option<&dyn Composite> {
        Some(self)
    }
    fn as_composite_mut(&mut self) -> Option<&mut dyn Composite> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scalar;

    #[test]
    fn list_holds_mixed_values() {
        let mut list = List::new();
        list.push_value(1i64);
        list.push_value("two".to_string());
        list.push_value(Scalar::Null);
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0).unwrap().as_scalar(), Some(Scalar::Int(1)));
        assert_eq!(
            list.get(1).unwrap().as_scalar(),
            Some(Scalar::Str("two".into()))
        );
    }

    #[test]
    fn list_set_item_replaces_any_type() {
        let mut list = List::new();
        list.push_value(1i64);
        assert!(Sequence::set_item(&mut list, 0, Box::new("swapped".to_string())));
        assert_eq!(
            list.get(0).unwrap().as_scalar(),
            Some(Scalar::Str("swapped".into()))
        );
        assert!(!Sequence::set_item(&mut list, 5, Box::new(0i64)));
    }

    #[test]
    fn bundle_accepts_new_keys_only_while_empty() {
        let mut bundle = Bundle::new();
        assert!(Composite::accepts_new_keys(&bundle));
        bundle.insert("a", 1i64);
        assert!(!Composite::accepts_new_keys(&bundle));
    }

    #[test]
    fn bundle_set_field_misses_unknown_keys() {
        let mut bundle = Bundle::new();
        bundle.insert("x", 1i64);
        assert!(Composite::set_field(&mut bundle, "x", Box::new(2i64)));
        assert!(!Composite::set_field(&mut bundle, "y", Box::new(3i64)));
        assert_eq!(bundle.get("x").unwrap().as_scalar(), Some(Scalar::Int(2)));
    }

    #[test]
    fn typed_vec_push_requires_matching_type() {
        let mut v: Vec<f64> = vec![1.0];
        assert!(Sequence::push(&mut v, Box::new(2.0f64)));
        assert!(!Sequence::push(&mut v, Box::new("nope".to_string())));
        assert_eq!(v, vec![1.0, 2.0]);
    }

    #[test]
    fn typed_vec_new_element_is_default() {
        let v: Vec<i64> = Vec::new();
        let fresh = Sequence::new_element(&v).unwrap();
        assert_eq!(fresh.as_scalar(), Some(Scalar::Int(0)));
    }

    #[test]
    fn typed_map_insert_field_coerces_scalars() {
        let mut m: BTreeMap<String, f64> = BTreeMap::new();
        assert!(Composite::accepts_new_keys(&m));
        assert!(Composite::insert_field(&mut m, "pi", Box::new(Scalar::Float(3.14))));
        assert!(Composite::insert_field(&mut m, "exact", Box::new(2.5f64)));
        assert!(!Composite::insert_field(
            &mut m,
            "bad",
            Box::new(Scalar::Str("not a float".into()))
        ));
        assert_eq!(m["pi"], 3.14);
        assert_eq!(m["exact"], 2.5);
        assert!(!m.contains_key("bad"));
    }

    #[test]
    fn clone_node_deep_copies_containers() {
        let mut list = List::new();
        list.push_value(5i64);
        let copy = list.clone_node();
        let copy = copy.as_any().downcast_ref::<List>().unwrap();
        assert_eq!(copy.len(), 1);
        assert_eq!(copy.get(0).unwrap().as_scalar(), Some(Scalar::Int(5)));
    }
}
