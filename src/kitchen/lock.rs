// src/kitchen/lock.rs

//! Cross-process install lock
//!
//! One lock file per package under `<prefix>/.formulary/locks/`. The lock
//! is taken with `flock(LOCK_EX | LOCK_NB)` so a second installer of the
//! same package fails fast with [`Error::Locked`] instead of waiting.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock on one package in one prefix, released on drop
#[derive(Debug)]
pub struct PrefixLock {
    file: File,
    path: PathBuf,
}

impl PrefixLock {
    /// Path of the lock file for `name` under `prefix`
    pub fn path_for(prefix: &Path, name: &str) -> PathBuf {
        prefix
            .join(".formulary")
            .join("locks")
            .join(format!("{}.lock", name))
    }

    /// Try to take the lock without blocking
    pub fn try_acquire(prefix: &Path, name: &str) -> Result<Self> {
        let path = Self::path_for(prefix, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired install lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(Error::Locked(name.to_string()))
            }
            Err(e) => Err(Error::IoError(format!(
                "Failed to lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PrefixLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released install lock at {}", self.path.display());
    }
}
