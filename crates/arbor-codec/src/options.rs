use std::time::Duration;

use serde::{Deserialize, Serialize};

use arbor_store::Codec;

/// Configuration for save and load passes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// Skip fields whose key starts with `_`.
    pub hide_private: bool,
    /// Move large tensors into the array store instead of inlining them.
    pub externalize_arrays: bool,
    /// Read externalized tensors back as memory-mapped views, and re-point
    /// live tensors at the mapped store copy after a save.
    pub mmap_arrays: bool,
    /// Element-count cutoff: tensors at or below it inline, above it
    /// externalize.
    pub array_size_threshold: usize,
    /// Compression codec handed through to the array store.
    pub compression: Option<Codec>,
    /// How long save/load may wait on the document lock. `None` blocks
    /// indefinitely.
    pub lock_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            hide_private: true,
            externalize_arrays: true,
            mmap_arrays: true,
            array_size_threshold: 25,
            compression: None,
            lock_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let opts = Options::default();
        assert!(opts.hide_private);
        assert!(opts.externalize_arrays);
        assert!(opts.mmap_arrays);
        assert_eq!(opts.array_size_threshold, 25);
        assert!(opts.compression.is_none());
        assert!(opts.lock_timeout.is_none());
    }
}
