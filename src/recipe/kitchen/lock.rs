// src/recipe/kitchen/lock.rs

//! Advisory lock over one architecture's build tree
//!
//! Two crossbake processes cooking the same architecture under the same
//! storage directory would trample each other's build dirs. Workers take
//! an exclusive `fs2` lock on `<build>/locks/<arch>.lock` for as long as
//! they cook; the lock is released when the guard drops.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Held lock on an architecture's build tree
#[derive(Debug)]
pub struct ArchLock {
    file: File,
    path: PathBuf,
}

impl ArchLock {
    /// Acquire the lock, blocking while another process holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(lock) = Self::try_acquire(path)? {
            return Ok(lock);
        }

        info!("Waiting for another build to release {}", path.display());
        let file = File::create(path)?;
        file.lock_exclusive()
            .map_err(|e| Error::IoError(format!("Failed to acquire build lock {}: {}", path.display(), e)))?;
        debug!("Acquired build lock at {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Acquire the lock if nobody holds it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired build lock at {}", path.display());
                Ok(Some(Self {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(Error::IoError(format!(
                "Failed to try-acquire build lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArchLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released build lock at {}", self.path.display());
    }
}
