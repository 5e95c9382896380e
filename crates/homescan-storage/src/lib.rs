//! File-backed state for homescan: run lock, run history, processed-item tracker
//! and the record store. Local files are the only source of truth; every write
//! goes through a temp file and an atomic rename.

use std::path::{Path, PathBuf};

mod atomic;
mod error;
mod ledger;
mod lock;
mod records;
mod tracker;

pub use atomic::{is_temp_file_name, sweep_temp_files, write_atomic};
pub use error::StorageError;
pub use ledger::{LedgerStats, RunLedger};
pub use lock::{LockAttempt, LockGuard, RunLock};
pub use records::{RecordKeys, RecordStore, SaveOutcome};
pub use tracker::{DedupTracker, FlushPolicy, TrackerPolicy, TrackerStats};

pub const CRATE_NAME: &str = "homescan-storage";

/// Fixed on-disk layout under one data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn properties_dir(&self) -> PathBuf {
        self.data_dir.join("properties")
    }

    pub fn run_history(&self) -> PathBuf {
        self.data_dir.join("run_history.json")
    }

    pub fn processed_items(&self) -> PathBuf {
        self.data_dir.join("processed_items.json")
    }

    pub fn index_json(&self) -> PathBuf {
        self.data_dir.join("index.json")
    }

    pub fn index_table(&self) -> PathBuf {
        self.data_dir.join("index.parquet")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.data_dir.join(".lock")
    }

    pub fn record_store(&self) -> RecordStore {
        RecordStore::new(self.properties_dir())
    }

    pub fn run_lock(&self) -> RunLock {
        RunLock::new(self.lock_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_fixed() {
        let layout = DataLayout::new("/srv/homescan");
        assert_eq!(layout.properties_dir(), PathBuf::from("/srv/homescan/properties"));
        assert_eq!(layout.run_history(), PathBuf::from("/srv/homescan/run_history.json"));
        assert_eq!(layout.processed_items(), PathBuf::from("/srv/homescan/processed_items.json"));
        assert_eq!(layout.index_json(), PathBuf::from("/srv/homescan/index.json"));
        assert_eq!(layout.index_table(), PathBuf::from("/srv/homescan/index.parquet"));
        assert_eq!(layout.lock_file(), PathBuf::from("/srv/homescan/.lock"));
    }
}
