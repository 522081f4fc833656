use thiserror::Error;

/// Errors produced by tree and tensor operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// A tensor shape does not match the supplied element count.
    #[error("shape {shape:?} requires {expected} elements, got {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    /// A dtype name that is not part of the document grammar.
    #[error("unknown dtype name: {0}")]
    UnknownDType(String),

    /// A mapped buffer is too short for the declared shape.
    #[error("buffer holds {actual} bytes, tensor needs {expected}")]
    BufferTooShort { expected: usize, actual: usize },
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
