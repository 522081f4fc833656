use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use arbor_tree::Tensor;

use crate::error::StoreResult;
use crate::traits::{validate_key, ArrayStore};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

/// In-memory, HashMap-based array store.
///
/// Intended for tests and embedding. Tensors are held behind a `RwLock`
/// and cloned on read/write; stored copies never carry a backing.
pub struct InMemoryArrayStore {
    id: String,
    tensors: RwLock<HashMap<String, Tensor>>,
}

impl InMemoryArrayStore {
    /// Create a new empty in-memory store with a unique identity.
    pub fn new() -> Self {
        let n = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("mem:{n}"),
            tensors: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.tensors.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tensors.read().expect("lock poisoned").is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.tensors.write().expect("lock poisoned").clear();
    }
}

impl Default for InMemoryArrayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayStore for InMemoryArrayStore {
    fn store_id(&self) -> &str {
        &self.id
    }

    fn write(&self, key: &str, tensor: &Tensor) -> StoreResult<()> {
        validate_key(key)?;
        let mut stored = tensor.clone();
        stored.set_backing(None);
        self.tensors
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), stored);
        Ok(())
    }

    fn read(&self, key: &str) -> StoreResult<Option<Tensor>> {
        validate_key(key)?;
        let map = self.tensors.read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let mut map = self.tensors.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    fn list_keys(&self) -> StoreResult<BTreeSet<String>> {
        let map = self.tensors.read().expect("lock poisoned");
        Ok(map.keys().cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryArrayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryArrayStore")
            .field("id", &self.id)
            .field("entries", &self.len())
            .finish()
    }
}
