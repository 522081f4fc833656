//! Advisory locking for the document file.
//!
//! Save and load both take an exclusive lock scoped to the whole
//! operation, so two processes cannot interleave their passes over the
//! same directory. The lock lives on the document file itself and is
//! released when the guard drops. A directory that has never been saved
//! has no document file and therefore nothing to lock.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::{PersistError, PersistResult};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Exclusive advisory lock on a document file, held until drop.
#[derive(Debug)]
pub struct DocLock {
    file: std::fs::File,
}

impl DocLock {
    /// Lock `path` if it exists; `Ok(None)` when there is no file yet.
    ///
    /// `timeout` of `None` blocks indefinitely. With a bound, contention
    /// is polled and [`PersistError::LockTimeout`] reported once the wait
    /// is exhausted.
    pub fn acquire_existing(
        path: &Path,
        timeout: Option<Duration>,
    ) -> PersistResult<Option<Self>> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match timeout {
            None => file.lock_exclusive()?,
            Some(limit) => {
                let start = Instant::now();
                loop {
                    match file.try_lock_exclusive() {
                        Ok(()) => break,
                        Err(e) if is_contended(&e) => {
                            if start.elapsed() >= limit {
                                return Err(PersistError::LockTimeout {
                                    path: path.to_path_buf(),
                                    waited: limit,
                                });
                            }
                            debug!(path = %path.display(), "document locked; waiting");
                            std::thread::sleep(RETRY_INTERVAL);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        Ok(Some(Self { file }))
    }
}

impl Drop for DocLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == fs2::lock_contended_error().kind()
        && e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
