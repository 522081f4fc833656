//! Type registry for dynamic construction.
//!
//! When the loader meets a tagged document object with no live counterpart,
//! it asks the registry for a zero-argument factory under that name. Names
//! that were never registered are the `UnknownTypeOnConstruct` case: the
//! loader skips the subtree instead of failing. The registry is plain,
//! caller-owned state; there is no process-wide table.

use std::collections::BTreeMap;

use crate::containers::{Bundle, List, BUNDLE_TYPE, LIST_TYPE};
use crate::node::Node;

type Factory = Box<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Maps fully-qualified type names to zero-argument constructors.
pub struct TypeRegistry {
    factories: BTreeMap<String, Factory>,
}

impl TypeRegistry {
    /// A registry with the built-in container types pre-registered.
    pub fn new() -> Self {
        let mut reg = Self {
            factories: BTreeMap::new(),
        };
        reg.register_default::<Bundle>(BUNDLE_TYPE);
        reg.register_default::<List>(LIST_TYPE);
        reg
    }

    /// Register a factory under a fully-qualified name. The name must match
    /// what the type's `Node::type_name` reports, or round-trips will not
    /// reconstruct it.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Node> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Register a `Default`-constructible node type.
    pub fn register_default<T: Node + Default>(&mut self, name: impl Into<String>) {
        self.register(name, || Box::new(T::default()) as Box<dyn Node>);
    }

    /// Construct a fresh instance, or `None` for unregistered names.
    pub fn construct(&self, name: &str) -> Option<Box<dyn Node>> {
        self.factories.get(name).map(|f| f())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeKind, Sequence};

    #[test]
    fn builtins_are_registered() {
        let reg = TypeRegistry::new();
        assert!(reg.contains(BUNDLE_TYPE));
        assert!(reg.contains(LIST_TYPE));
        let bundle = reg.construct(BUNDLE_TYPE).unwrap();
        assert_eq!(bundle.kind(), NodeKind::Composite);
    }

    #[test]
    fn unregistered_name_returns_none() {
        let reg = TypeRegistry::new();
        assert!(reg.construct("ghost.Type").is_none());
    }

    #[test]
    fn register_default_constructs_fresh_instances() {
        let mut reg = TypeRegistry::new();
        reg.register_default::<Vec<i64>>("demo.Ints");
        let a = reg.construct("demo.Ints").unwrap();
        assert_eq!(a.kind(), NodeKind::Sequence);
        assert_eq!(a.as_sequence().unwrap().len(), 0);
    }
}
