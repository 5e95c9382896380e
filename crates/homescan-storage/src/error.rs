use std::path::{Path, PathBuf};

use homescan_core::KeyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// A history or tracker file exists but cannot be read back. Never reset silently.
    #[error("{} is unreadable and was left untouched: {reason}", .path.display())]
    LedgerCorruption { path: PathBuf, reason: String },
    #[error("record file {} cannot be parsed: {reason}", .path.display())]
    CorruptRecord { path: PathBuf, reason: String },
    #[error("record {0} not found")]
    NotFound(String),
    #[error("record {key} is already stored with different content")]
    KeyConflict { key: String },
    #[error(transparent)]
    InvalidKey(#[from] KeyError),
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }

    pub(crate) fn corrupt_ledger(path: &Path, reason: impl ToString) -> Self {
        Self::LedgerCorruption {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
