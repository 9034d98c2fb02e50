//! Advisory cross-process file locks.
//!
//! Each `exo` invocation is its own process, so exclusion for writers of the
//! model artifact and the feedback table has to live on disk. A lock is a
//! sidecar `<path>.lock` file held exclusively until the guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

/// `<path>.lock`
pub fn lock_path(path: &Path) -> PathBuf {
    super::artifact::with_suffix(path, "lock")
}

/// Exclusive lock on `<path>.lock`; released on drop.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the lock guarding `path` is ours.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        let lock = lock_path(path);
        if let Some(parent) = lock.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock)?;
        file.lock_exclusive()?;
        tracing::debug!(lock = %lock.display(), "acquired file lock");
        Ok(Self { _file: file, path: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
