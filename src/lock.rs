use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::{BackupError, Result};

/// Advisory lock serialising dump, restore and delete operations across
/// processes. Released when dropped.
#[derive(Debug)]
pub struct OperationLock {
    path: PathBuf,
    file: File,
}

impl OperationLock {
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BackupError::write_failed(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| BackupError::write_failed(lock_path, e))?;
        file.try_lock_exclusive().map_err(|_| BackupError::Busy {
            lock_path: lock_path.to_path_buf(),
        })?;

        tracing::debug!("Acquired operation lock {}", lock_path.display());
        Ok(OperationLock {
            path: lock_path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
