//! Live state-tree model for Arbor.
//!
//! Arbor reconciles an already-instantiated object tree against a stored
//! document rather than reconstructing it from scratch. This crate defines
//! what a tree is made of:
//!
//! - [`Node`] — the polymorphic value every participant implements
//! - [`Composite`] / [`Sequence`] — the introspection capabilities driving
//!   reconciliation
//! - [`List`] / [`Bundle`] — dynamic containers for document-shaped data
//! - [`Tensor`] — n-dimensional arrays, owned or memory-mapped
//! - [`TypeRegistry`] — fully-qualified name → zero-argument factory
//! - [`TreePath`] — structural paths and the path accessor utility

pub mod containers;
pub mod error;
pub mod node;
pub mod path;
pub mod registry;
pub mod tensor;

pub use containers::{Bundle, List, BUNDLE_TYPE, LIST_TYPE};
pub use error::{TreeError, TreeResult};
pub use node::{Composite, Node, NodeKind, Scalar, Sequence, StateMap};
pub use path::{get_path, get_path_mut, set_path, Step, TreePath};
pub use registry::TypeRegistry;
pub use tensor::{Backing, DType, Elem, Element, Tensor, TENSOR_TYPE};
