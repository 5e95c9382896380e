//! Host-wide run exclusion through an OS advisory lock on a file.
//!
//! The kernel drops the lock when the holding process exits, so a crashed run
//! never leaves the pipeline locked. Acquisition never waits.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use tracing::{debug, warn};

use crate::StorageError;

#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
}

#[derive(Debug)]
pub enum LockAttempt {
    Acquired(LockGuard),
    /// Another live process holds the lock; `holder` is its marker, when readable.
    Busy { holder: Option<String> },
}

impl LockAttempt {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub fn into_guard(self) -> Option<LockGuard> {
        match self {
            Self::Acquired(guard) => Some(guard),
            Self::Busy { .. } => None,
        }
    }
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_acquire(&self) -> Result<LockAttempt, StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(StorageError::io("creating lock directory", parent))?;
        }

        // No truncate on open: the current holder's marker must survive a failed attempt.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(StorageError::io("opening lock file", &self.path))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(err) if is_contended(&err) => {
                let holder = self.holder();
                debug!(path = %self.path.display(), ?holder, "run lock busy");
                return Ok(LockAttempt::Busy { holder });
            }
            Err(err) => return Err(StorageError::io("locking", &self.path)(err)),
        }

        let marker = format!(
            "pid={} acquired_at={}\n",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        file.set_len(0)
            .and_then(|_| file.write_all(marker.as_bytes()))
            .and_then(|_| file.sync_data())
            .map_err(StorageError::io("writing lock marker", &self.path))?;

        debug!(path = %self.path.display(), "run lock acquired");
        Ok(LockAttempt::Acquired(LockGuard {
            file: Some(file),
            path: self.path.clone(),
        }))
    }

    /// Marker left by the current (or last) holder.
    pub fn holder(&self) -> Option<String> {
        let mut text = String::new();
        File::open(&self.path).ok()?.read_to_string(&mut text).ok()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    let contended = fs2::lock_contended_error();
    err.kind() == contended.kind() || err.raw_os_error() == contended.raw_os_error()
}

/// Scoped ownership of the run lock; dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Release early. Calling it again, or dropping afterwards, is a no-op.
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // The file itself stays: unlinking it would let a racing opener lock a detached inode.
        if let Err(err) = file.set_len(0) {
            warn!(path = %self.path.display(), error = %err, "clearing lock marker failed");
        }
        if let Err(err) = FileExt::unlock(&file) {
            warn!(path = %self.path.display(), error = %err, "explicit unlock failed; closing file");
        }
        drop(file);
        debug!(path = %self.path.display(), "run lock released");
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
