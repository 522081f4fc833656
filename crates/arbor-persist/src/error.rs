use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use arbor_store::StoreError;

/// Errors from persistence operations.
///
/// Faults inside the tree walk never surface here; the codec recovers
/// them locally. These are the operation-level failures: filesystem and
/// lock problems, unparseable documents, and the all-skipped save.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The entire tree serialized to skip; nothing was written.
    #[error("nothing to save: every value in the tree was skipped")]
    NothingToSave,

    /// The document lock could not be acquired within the configured wait.
    #[error("timed out after {waited:?} waiting for lock on {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// The document file is not valid JSON.
    #[error("document parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Array store failure while externalizing or sweeping.
    #[error("array store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error on the document file or directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
