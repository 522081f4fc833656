use thiserror::Error;

/// Errors from array store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is empty, hidden, or contains path separators.
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),

    /// The entry exists but cannot be decoded (bad magic, CRC, or shape).
    #[error("corrupt store entry {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A file format version this build does not understand.
    #[error("unsupported array file version: {0}")]
    UnsupportedVersion(u8),

    /// Compression or decompression failure.
    #[error("compression error: {0}")]
    Compression(String),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
