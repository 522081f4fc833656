//! Structural paths and the path accessor utility.
//!
//! A [`TreePath`] locates a value from the tree root: named steps address
//! composite fields, numeric steps index sequences. The slash form
//! (`"/sensors/0/offset"`) is the accessor syntax; the dotted form
//! (`"sensors.0.offset"`) keys the array store.

use crate::node::{Composite, Node, Sequence};

/// One step along a structural path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// A composite field name.
    Key(String),
    /// A sequence index.
    Index(usize),
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Key(k) => f.write_str(k),
            Step::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A structural path from the tree root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreePath {
    steps: Vec<Step>,
}

impl TreePath {
    /// The empty path (the root itself).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse the slash form. Empty segments are ignored, so leading and
    /// trailing slashes are fine; all-digit segments become indices.
    pub fn parse(path: &str) -> Self {
        let steps = path
            .trim()
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(|seg| match seg.parse::<usize>() {
                Ok(i) => Step::Index(i),
                Err(_) => Step::Key(seg.to_string()),
            })
            .collect();
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn push_key(&mut self, key: &str) {
        self.steps.push(Step::Key(key.to_string()));
    }

    pub fn push_index(&mut self, index: usize) {
        self.steps.push(Step::Index(index));
    }

    pub fn pop(&mut self) {
        self.steps.pop();
    }

    /// The dot-joined store-key form.
    pub fn dotted(&self) -> String {
        self.steps
            .iter()
            .map(Step::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

fn descend<'a>(node: &'a dyn Node, step: &Step) -> Option<&'a dyn Node> {
    match step {
        Step::Key(k) => node.as_composite()?.field(k),
        Step::Index(i) => match node.as_sequence() {
            Some(seq) => seq.get(*i),
            // Numeric keys on a mapping address the field by name.
            None => node.as_composite()?.field(&i.to_string()),
        },
    }
}

fn descend_mut<'a>(node: &'a mut dyn Node, step: &Step) -> Option<&'a mut dyn Node> {
    match step {
        Step::Key(k) => node.as_composite_mut()?.field_mut(k),
        Step::Index(i) => {
            if node.as_sequence().is_some() {
                node.as_sequence_mut()?.get_mut(*i)
            } else {
                node.as_composite_mut()?.field_mut(&i.to_string())
            }
        }
    }
}

/// Walk `path` down from `root`, returning the addressed value.
pub fn get_path<'a>(root: &'a dyn Node, path: &TreePath) -> Option<&'a dyn Node> {
    let mut node = root;
    for step in path.steps() {
        node = descend(node, step)?;
    }
    Some(node)
}

/// Mutable variant of [`get_path`].
pub fn get_path_mut<'a>(root: &'a mut dyn Node, path: &TreePath) -> Option<&'a mut dyn Node> {
    let mut node = root;
    for step in path.steps() {
        node = descend_mut(node, step)?;
    }
    Some(node)
}

/// Replace the value addressed by `path`. Mapping-like parents accept keys
/// that are not present yet; the empty path cannot be set. Returns `false`
/// when the path does not resolve or the value does not fit the slot.
pub fn set_path(root: &mut dyn Node, path: &TreePath, value: Box<dyn Node>) -> bool {
    let Some((last, prefix)) = path.steps().split_last() else {
        return false;
    };
    let mut parent = root;
    for step in prefix {
        match descend_mut(parent, step) {
            Some(next) => parent = next,
            None => return false,
        }
    }
    match last {
        Step::Key(k) => match parent.as_composite_mut() {
            Some(c) => c.set_field(k, value.clone()) || c.insert_field(k, value),
            None => false,
        },
        Step::Index(i) => match parent.as_sequence_mut() {
            Some(seq) => seq.set_item(*i, value),
            None => match parent.as_composite_mut() {
                Some(c) => {
                    let key = i.to_string();
                    c.set_field(&key, value.clone()) || c.insert_field(&key, value)
                }
                None => false,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::{Bundle, List};
    use crate::Scalar;

    fn sample_tree() -> Bundle {
        let mut inner = Bundle::new();
        inner.insert("offset", 4.5f64);
        let mut list = List::new();
        list.push_value("hello".to_string());
        list.push_value(inner);
        let mut root = Bundle::new();
        root.insert("sensors", list);
        root.insert("count", 2i64);
        root
    }

    #[test]
    fn parse_slash_form() {
        let p = TreePath::parse("/sensors/0/offset/");
        assert_eq!(
            p.steps(),
            &[
                Step::Key("sensors".into()),
                Step::Index(0),
                Step::Key("offset".into())
            ]
        );
        assert_eq!(p.dotted(), "sensors.0.offset");
        assert_eq!(p.to_string(), "/sensors/0/offset");
    }

    #[test]
    fn get_walks_fields_and_indices() {
        let tree = sample_tree();
        let v = get_path(&tree, &TreePath::parse("/sensors/1/offset")).unwrap();
        assert_eq!(v.as_scalar(), Some(Scalar::Float(4.5)));
        assert!(get_path(&tree, &TreePath::parse("/sensors/7")).is_none());
        assert!(get_path(&tree, &TreePath::parse("/missing")).is_none());
    }

    #[test]
    fn empty_path_is_the_root() {
        let tree = sample_tree();
        assert!(get_path(&tree, &TreePath::root()).is_some());
    }

    #[test]
    fn set_replaces_nested_value() {
        let mut tree = sample_tree();
        assert!(set_path(
            &mut tree,
            &TreePath::parse("/sensors/0"),
            Box::new("replaced".to_string())
        ));
        let v = get_path(&tree, &TreePath::parse("/sensors/0")).unwrap();
        assert_eq!(v.as_scalar(), Some(Scalar::Str("replaced".into())));
    }

    #[test]
    fn set_inserts_into_mapping() {
        let mut tree = sample_tree();
        assert!(set_path(
            &mut tree,
            &TreePath::parse("/fresh"),
            Box::new(1i64)
        ));
        assert!(tree.contains_key("fresh"));
    }

    #[test]
    fn set_rejects_root_and_bad_paths() {
        let mut tree = sample_tree();
        assert!(!set_path(&mut tree, &TreePath::root(), Box::new(1i64)));
        assert!(!set_path(
            &mut tree,
            &TreePath::parse("/sensors/9"),
            Box::new(1i64)
        ));
    }
}
