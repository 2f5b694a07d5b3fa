//! Single-instance guard.

use crate::{Error, Result};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

/// Name of the lock a run holds inside the directory it writes to.
pub const DIR_LOCK_NAME: &str = ".daybook.lock";

/// Lock file for a run that owns `dir`.
#[must_use]
pub fn dir_lock_path(dir: &Path) -> PathBuf {
    dir.join(DIR_LOCK_NAME)
}

/// Exclusive lock held for the lifetime of a run.
///
/// The lock is taken with an OS-level advisory lock, so it is released when the
/// guard drops and also when the process dies without unwinding.
#[derive(Debug)]
pub struct SingleInstanceGuard {
    file: File,
    path: PathBuf,
}

impl SingleInstanceGuard {
    /// Takes the lock on `path` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstanceLocked`] if another process holds the lock, or
    /// [`Error::OperationFailed`] if the lock file cannot be opened.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::failed("create_lock_dir", e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::failed("open_lock_file", format!("{}: {e}", path.display())))?;

        match file.try_lock() {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Acquired instance lock");
                Ok(Self { file, path })
            },
            Err(TryLockError::WouldBlock) => Err(Error::InstanceLocked { path }),
            Err(TryLockError::Error(e)) => Err(Error::failed(
                "lock_file",
                format!("{}: {e}", path.display()),
            )),
        }
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release instance lock");
        }
    }
}
