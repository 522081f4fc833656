//! Array storage for Arbor.
//!
//! Large tensors do not live inside the JSON document; the serializer moves
//! them into an array store keyed by structural path and leaves a reference
//! behind. This crate defines the store contract and its backends:
//!
//! - [`ArrayStore`] — the write/read/delete/list interface
//! - [`DirArrayStore`] — one binary file per key, CRC-checked, optionally
//!   zstd-compressed, with memory-mapped read-back
//! - [`InMemoryArrayStore`] — `HashMap`-based store for tests and embedding

pub mod dir;
pub mod error;
pub mod memory;
pub mod traits;

pub use dir::{Codec, DirArrayStore};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryArrayStore;
pub use traits::ArrayStore;
