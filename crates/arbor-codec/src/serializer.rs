//! Tree → document serialization.
//!
//! One pass over a live tree produces a `serde_json::Value` document.
//! Tensors above the size threshold leave the document entirely: they are
//! written into the array store under the current structural path and an
//! external reference is emitted instead. The pass records every store key
//! it touches so the persistence layer can sweep the rest.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::warn;

use arbor_store::{ArrayStore, StoreResult};
use arbor_tree::{Backing, Composite, Node, Sequence, TreePath};

use crate::doc::{self, CLASS_KEY};
use crate::options::Options;

/// The position of a value relative to its parent.
#[derive(Clone, Copy, Debug)]
pub enum Key<'a> {
    /// The tree root.
    Root,
    /// A composite field.
    Field(&'a str),
    /// A sequence index.
    Index(usize),
}

/// Walks a live tree and produces its document.
///
/// `serialize` returns `Ok(None)` for values that should not appear in the
/// document (the original's `Skip`): private-prefixed fields,
/// unrepresentable values, and composites whose every field skipped.
pub struct Serializer<'a> {
    store: Option<&'a dyn ArrayStore>,
    options: &'a Options,
    path: TreePath,
    touched: BTreeSet<String>,
}

impl<'a> Serializer<'a> {
    /// A serializer writing externalized tensors into `store`. Pass `None`
    /// to force everything inline (the string transport does).
    pub fn new(store: Option<&'a dyn ArrayStore>, options: &'a Options) -> Self {
        Self {
            store,
            options,
            path: TreePath::root(),
            touched: BTreeSet::new(),
        }
    }

    /// Store keys written or reused during this pass.
    pub fn touched(&self) -> &BTreeSet<String> {
        &self.touched
    }

    pub fn into_touched(self) -> BTreeSet<String> {
        self.touched
    }

    /// Serialize one value. `key` is its position in the parent; private
    /// field keys are skipped here so hook-provided state obeys the same
    /// rule as regular fields.
    pub fn serialize(&mut self, node: &mut dyn Node, key: Key<'_>) -> StoreResult<Option<Value>> {
        if let Key::Field(name) = key {
            if self.options.hide_private && name.starts_with('_') {
                return Ok(None);
            }
        }

        if node.as_tensor().is_some() {
            return self.serialize_tensor(node);
        }
        if node.as_sequence().is_some() {
            return self.serialize_sequence(node);
        }
        if node.as_composite().is_some() {
            return self.serialize_composite(node);
        }
        if let Some(scalar) = node.as_scalar() {
            return Ok(Some(doc::scalar_to_value(&scalar)));
        }

        warn!(
            path = %self.path,
            ty = node.type_name(),
            "cannot serialize value; skipping"
        );
        Ok(None)
    }

    fn serialize_tensor(&mut self, node: &mut dyn Node) -> StoreResult<Option<Value>> {
        let key = self.path.dotted();
        let store = match self.store {
            Some(store) if self.options.externalize_arrays && !key.is_empty() => store,
            _ => {
                let tensor = node.as_tensor().expect("checked tensor");
                return Ok(Some(doc::inline_tensor(tensor)));
            }
        };
        let tensor = node.as_tensor_mut().expect("checked tensor");

        // Small tensors inline; store-backed ones stay external regardless
        // of size.
        if tensor.len() <= self.options.array_size_threshold && tensor.backing().is_none() {
            return Ok(Some(doc::inline_tensor(tensor)));
        }

        // Re-point only if the current backing differs from this position.
        if let Some(backing) = tensor.backing() {
            if backing.store == store.store_id() && backing.key == key {
                self.touched.insert(key.clone());
                return Ok(Some(doc::extern_ref(&key)));
            }
        }

        store.write(&key, tensor)?;
        tensor.set_backing(Some(Backing {
            store: store.store_id().to_string(),
            key: key.clone(),
        }));

        // Optionally swap the live buffer for the store-backed view; this
        // mutates the source tree, not just the document.
        if self.options.mmap_arrays {
            if let Some(mut mapped) = store.read_mapped(&key)? {
                if mapped.is_mapped() {
                    mapped.set_backing(tensor.backing().cloned());
                    *tensor = mapped;
                }
            }
        }

        self.touched.insert(key.clone());
        Ok(Some(doc::extern_ref(&key)))
    }

    fn serialize_sequence(&mut self, node: &mut dyn Node) -> StoreResult<Option<Value>> {
        let seq = node.as_sequence_mut().expect("checked sequence");
        let len = seq.len();
        let mut items = Vec::with_capacity(len);
        for i in 0..len {
            let Some(child) = seq.get_mut(i) else { break };
            self.path.push_index(i);
            let out = self.serialize(child, Key::Index(i));
            self.path.pop();
            if let Some(value) = out? {
                items.push(value);
            }
        }
        Ok(Some(Value::Array(items)))
    }

    fn serialize_composite(&mut self, node: &mut dyn Node) -> StoreResult<Option<Value>> {
        let tag = node.type_name().to_string();
        let comp = node.as_composite_mut().expect("checked composite");

        let mut map = Map::new();

        if let Some(mut state) = comp.save_state() {
            // Custom save hook: serialize its projection instead of the
            // live fields. Store side effects stay on the hook's copies.
            for (name, child) in state.iter_mut() {
                self.path.push_key(name);
                let out = self.serialize(child.as_mut(), Key::Field(name.as_str()));
                self.path.pop();
                if let Some(value) = out? {
                    map.insert(name.clone(), value);
                }
            }
        } else {
            for name in comp.field_names() {
                let Some(child) = comp.field_mut(&name) else {
                    continue;
                };
                self.path.push_key(&name);
                let out = self.serialize(child, Key::Field(name.as_str()));
                self.path.pop();
                if let Some(value) = out? {
                    map.insert(name, value);
                }
            }
        }

        // A composite that contributed nothing disappears entirely.
        if map.is_empty() {
            return Ok(None);
        }
        map.insert(CLASS_KEY.to_string(), Value::String(tag));
        Ok(Some(Value::Object(map)))
    }
}
