//! The persistence controller.
//!
//! A [`StateDir`] owns everything one persisted tree needs: the target
//! directory, the array store rooted at its `extern/` area, the type
//! registry for dynamic construction, and the options. Saving serializes
//! under an exclusive lock, writes the document through a temp file that
//! is atomically renamed into place, and then sweeps every array store
//! entry the pass did not touch. Loading mirrors it: lock, parse,
//! reconcile in place, sweep.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use arbor_codec::{Key, Loader, Options, Serializer};
use arbor_store::{ArrayStore, DirArrayStore};
use arbor_tree::{Node, TypeRegistry};

use crate::error::{PersistError, PersistResult};
use crate::lock::DocLock;

/// Name of the document file inside a state directory.
pub const STATE_FILE: &str = "state.json";

/// Name of the array store area inside a state directory.
pub const EXTERN_DIR: &str = "extern";

/// A directory holding one persisted tree: `state.json` plus an `extern/`
/// array store.
pub struct StateDir {
    root: PathBuf,
    store: DirArrayStore,
    registry: TypeRegistry,
    options: Options,
}

impl StateDir {
    /// Open (creating if needed) a state directory.
    pub fn open(
        root: impl AsRef<Path>,
        registry: TypeRegistry,
        options: Options,
    ) -> PersistResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let store = DirArrayStore::open(&root.join(EXTERN_DIR), options.compression)?;
        Ok(Self {
            root,
            store,
            registry,
            options,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// The array store backing this directory.
    pub fn store(&self) -> &DirArrayStore {
        &self.store
    }

    fn doc_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Serialize `tree` into this directory.
    ///
    /// The document is replaced atomically; array store entries not touched
    /// by this pass are deleted afterwards. A tree that serializes entirely
    /// to skip aborts with [`PersistError::NothingToSave`] before anything
    /// is written.
    pub fn save(&self, tree: &mut dyn Node) -> PersistResult<()> {
        let doc_path = self.doc_path();
        // First-ever save has no document to lock.
        let _lock = DocLock::acquire_existing(&doc_path, self.options.lock_timeout)?;

        let mut serializer = Serializer::new(Some(&self.store), &self.options);
        let doc = serializer
            .serialize(tree, Key::Root)?
            .ok_or(PersistError::NothingToSave)?;

        let text = serde_json::to_string_pretty(&doc)?;
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&doc_path).map_err(|e| PersistError::Io(e.error))?;

        let removed = self.sweep(serializer.touched())?;
        debug!(
            path = %doc_path.display(),
            arrays = serializer.touched().len(),
            swept = removed,
            "saved state"
        );
        Ok(())
    }

    /// Reconcile `tree` from this directory.
    ///
    /// Returns `Ok(false)` when no document exists ("nothing to load");
    /// the tree is then left untouched.
    pub fn load(&self, tree: &mut dyn Node) -> PersistResult<bool> {
        let doc_path = self.doc_path();
        let Some(_lock) = DocLock::acquire_existing(&doc_path, self.options.lock_timeout)? else {
            return Ok(false);
        };

        let text = fs::read_to_string(&doc_path)?;
        let doc: Value = serde_json::from_str(&text)?;

        let mut loader = Loader::new(Some(&self.store), &self.registry, &self.options);
        loader.load(Some(tree), &doc);

        let removed = self.sweep(loader.touched())?;
        debug!(
            path = %doc_path.display(),
            arrays = loader.touched().len(),
            swept = removed,
            "loaded state"
        );
        Ok(true)
    }

    /// Mark-and-sweep: delete every store entry whose key was not touched
    /// by the pass that just finished.
    fn sweep(&self, touched: &BTreeSet<String>) -> PersistResult<usize> {
        let mut removed = 0;
        for key in self.store.list_keys()? {
            if !touched.contains(&key) && self.store.delete(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for StateDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDir")
            .field("root", &self.root)
            .finish()
    }
}
