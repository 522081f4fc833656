//! The [`ArrayStore`] trait defining the array storage interface.
//!
//! Any backend (in-memory, directory) implements this trait to hold the
//! tensors a document references by structural path instead of carrying
//! inline.

use std::collections::BTreeSet;

use arbor_tree::Tensor;

use crate::error::StoreResult;

/// Keyed storage for externalized tensors.
///
/// Keys are dot-joined structural paths (`"sensors.0.frame"`). All
/// implementations must satisfy these invariants:
/// - Writing an existing key overwrites it; there is no versioning.
/// - Reads of absent keys return `Ok(None)`, never an error.
/// - All I/O errors are propagated, never silently ignored.
/// - Entries outlive individual save/load calls; the persistence layer
///   sweeps the ones a pass did not touch.
pub trait ArrayStore: Send + Sync {
    /// Stable identity of this store, compared against tensor backings to
    /// decide whether an existing external reference can be reused.
    fn store_id(&self) -> &str;

    /// Write a tensor under `key`, replacing any previous entry.
    fn write(&self, key: &str, tensor: &Tensor) -> StoreResult<()>;

    /// Read the tensor at `key` into an owned buffer.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    fn read(&self, key: &str) -> StoreResult<Option<Tensor>>;

    /// Read the tensor at `key` as a storage-backed handle where the
    /// backend supports it. Default falls back to an owned read.
    fn read_mapped(&self, key: &str) -> StoreResult<Option<Tensor>> {
        self.read(key)
    }

    /// Delete the entry at `key`. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All keys currently stored.
    fn list_keys(&self) -> StoreResult<BTreeSet<String>>;
}

/// Shared key validation: keys are single path components.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    use crate::error::StoreError;
    if key.is_empty()
        || key.starts_with('.')
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
