//! Document codec for Arbor.
//!
//! Converts between live state trees and their JSON document form:
//!
//! - [`Serializer`] — tree → document, externalizing large tensors into an
//!   array store keyed by structural path
//! - [`Loader`] — document → reconciled live tree, updating an existing
//!   tree in place and constructing fresh values only where no counterpart
//!   exists
//! - [`Options`] — the shared configuration surface
//! - [`doc`] — the document grammar (type-tags, external references,
//!   inline tensors)

pub mod doc;
pub mod loader;
pub mod options;
pub mod serializer;

pub use loader::{Loader, Outcome};
pub use options::Options;
pub use serializer::{Key, Serializer};
