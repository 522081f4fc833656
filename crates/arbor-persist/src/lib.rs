//! Persistence for Arbor state trees.
//!
//! Orchestrates the codec against real storage:
//!
//! - [`StateDir`] — a target directory with its document file, array
//!   store, registry, and options; `save` and `load` are atomic and
//!   serialized by an exclusive advisory lock on the document
//! - [`serialize_to_string`] / [`load_from_string`] — the lock-free,
//!   store-free string transport
//! - [`PersistError`] — the operation-level failures; everything inside
//!   the tree walk is recovered locally and reported via `tracing`

pub mod error;
pub mod lock;
pub mod state_dir;
pub mod transport;

pub use error::{PersistError, PersistResult};
pub use lock::DocLock;
pub use state_dir::{StateDir, EXTERN_DIR, STATE_FILE};
pub use transport::{load_from_string, serialize_to_string};
