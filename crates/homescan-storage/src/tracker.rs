//! External id -> processing outcome map that keeps finished items from being redone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use homescan_core::{ItemOutcome, ProcessedItemEntry};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::atomic::write_atomic;
use crate::StorageError;

const TRACKER_VERSION: u32 = 1;

/// When in-memory marks reach disk.
///
/// `PerItem` rewrites the tracker after every finalized item, so an interrupted run
/// redoes at most the item in flight. `RunEnd` writes once, trading that for fewer
/// rewrites: everything marked since the last flush is redone after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    #[default]
    PerItem,
    RunEnd,
}

impl std::str::FromStr for FlushPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_item" => Ok(Self::PerItem),
            "run_end" => Ok(Self::RunEnd),
            other => Err(format!("unknown tracker flush policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerPolicy {
    pub flush: FlushPolicy,
    /// Ids whose last outcome was a failure are handed out again.
    pub retry_failed: bool,
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        Self {
            flush: FlushPolicy::PerItem,
            retry_failed: true,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerFile {
    version: u32,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    items: BTreeMap<String, ProcessedItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub unique_items: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct DedupTracker {
    path: PathBuf,
    policy: TrackerPolicy,
    items: BTreeMap<String, ProcessedItemEntry>,
    last_updated: Option<DateTime<Utc>>,
    dirty: bool,
}

impl DedupTracker {
    pub async fn open(path: impl Into<PathBuf>, policy: TrackerPolicy) -> Result<Self, StorageError> {
        let path = path.into();
        let doc = match fs::read(&path).await {
            Ok(bytes) => parse_tracker(&path, &bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => TrackerFile::default(),
            Err(err) => return Err(StorageError::io("reading tracker", &path)(err)),
        };
        Ok(Self {
            path,
            policy,
            items: doc.items,
            last_updated: doc.last_updated,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> TrackerPolicy {
        self.policy
    }

    pub fn entry(&self, id: &str) -> Option<&ProcessedItemEntry> {
        self.items.get(id)
    }

    /// Whether `id` is done and would be dropped by [`Self::filter_unprocessed`].
    pub fn is_processed(&self, id: &str) -> bool {
        match self.items.get(id) {
            Some(entry) => entry.outcome == ItemOutcome::Success || !self.policy.retry_failed,
            None => false,
        }
    }

    /// Keep the ids still needing work, in input order.
    pub fn filter_unprocessed<T: AsRef<str>>(&self, ids: Vec<T>) -> Vec<T> {
        self.retain_unprocessed_by(ids, |id| id.as_ref())
    }

    pub fn retain_unprocessed_by<T>(&self, items: Vec<T>, id_of: impl Fn(&T) -> &str) -> Vec<T> {
        items
            .into_iter()
            .filter(|item| !self.is_processed(id_of(item)))
            .collect()
    }

    /// Record the final outcome for `id`, replacing any earlier entry.
    /// Under [`FlushPolicy::PerItem`] the tracker is written before returning.
    pub async fn mark_processed(
        &mut self,
        id: &str,
        entry: ProcessedItemEntry,
    ) -> Result<(), StorageError> {
        debug!(id, outcome = ?entry.outcome, "marking item");
        self.last_updated = Some(entry.processed_at);
        self.items.insert(id.to_string(), entry);
        self.dirty = true;
        if self.policy.flush == FlushPolicy::PerItem {
            self.flush().await?;
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write pending marks. A no-op when nothing changed since the last flush.
    pub async fn flush(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        let doc = TrackerFile {
            version: TRACKER_VERSION,
            last_updated: self.last_updated,
            items: self.items.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|source| StorageError::Serialize {
            what: "processed items",
            source,
        })?;
        write_atomic(&self.path, &bytes).await?;
        self.dirty = false;
        Ok(())
    }

    pub fn stats(&self) -> TrackerStats {
        let succeeded = self
            .items
            .values()
            .filter(|e| e.outcome == ItemOutcome::Success)
            .count();
        TrackerStats {
            unique_items: self.items.len(),
            succeeded,
            failed: self.items.len() - succeeded,
            last_updated: self.last_updated,
        }
    }
}

fn parse_tracker(path: &Path, bytes: &[u8]) -> Result<TrackerFile, StorageError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(StorageError::corrupt_ledger(path, "file is empty"));
    }
    let doc: TrackerFile =
        serde_json::from_slice(bytes).map_err(|err| StorageError::corrupt_ledger(path, err))?;
    if doc.version > TRACKER_VERSION {
        return Err(StorageError::corrupt_ledger(
            path,
            format!("unsupported tracker version {}", doc.version),
        ));
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn done(outcome: ItemOutcome) -> ProcessedItemEntry {
        ProcessedItemEntry {
            outcome,
            processed_at: Utc::now(),
            failure_kind: (outcome == ItemOutcome::Failure).then(|| "extraction".to_string()),
            note: None,
        }
    }

    async fn seeded(dir: &Path, policy: TrackerPolicy) -> DedupTracker {
        let mut tracker = DedupTracker::open(dir.join("processed_items.json"), policy)
            .await
            .expect("open");
        tracker.mark_processed("b", done(ItemOutcome::Success)).await.unwrap();
        tracker.mark_processed("d", done(ItemOutcome::Failure)).await.unwrap();
        tracker
    }

    #[tokio::test]
    async fn filter_keeps_input_order_for_every_permutation() {
        let dir = tempdir().expect("tempdir");
        let tracker = seeded(dir.path(), TrackerPolicy::default()).await;

        let base = ["a", "b", "c", "d"];
        let mut seen = 0;
        for i in 0..4 {
            for j in 0..4 {
                for k in 0..4 {
                    for l in 0..4 {
                        let idx = [i, j, k, l];
                        if (0..4).any(|n| !idx.contains(&n)) {
                            continue;
                        }
                        let input: Vec<&str> = idx.iter().map(|&n| base[n]).collect();
                        let expected: Vec<&str> =
                            input.iter().copied().filter(|id| *id != "b").collect();
                        assert_eq!(tracker.filter_unprocessed(input.clone()), expected);
                        seen += 1;
                    }
                }
            }
        }
        assert_eq!(seen, 24);
    }

    #[tokio::test]
    async fn failed_ids_are_skipped_when_retry_is_off() {
        let dir = tempdir().expect("tempdir");
        let policy = TrackerPolicy {
            retry_failed: false,
            ..TrackerPolicy::default()
        };
        let tracker = seeded(dir.path(), policy).await;
        assert!(tracker.is_processed("d"));
        assert_eq!(tracker.filter_unprocessed(vec!["d", "e", "b"]), vec!["e"]);
    }

    #[tokio::test]
    async fn per_item_policy_persists_each_mark() {
        let dir = tempdir().expect("tempdir");
        let tracker = seeded(dir.path(), TrackerPolicy::default()).await;
        assert!(!tracker.is_dirty());

        let reopened = DedupTracker::open(tracker.path(), TrackerPolicy::default())
            .await
            .expect("reopen");
        assert!(reopened.is_processed("b"));
        assert!(!reopened.is_processed("d"));
        let stats = reopened.stats();
        assert_eq!((stats.unique_items, stats.succeeded, stats.failed), (2, 1, 1));
    }

    #[tokio::test]
    async fn run_end_policy_writes_only_on_flush() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("processed_items.json");
        let policy = TrackerPolicy {
            flush: FlushPolicy::RunEnd,
            retry_failed: true,
        };
        let mut tracker = DedupTracker::open(&path, policy).await.unwrap();
        tracker.mark_processed("x", done(ItemOutcome::Success)).await.unwrap();
        assert!(tracker.is_dirty());
        assert!(!path.exists());

        tracker.flush().await.unwrap();
        assert!(!tracker.is_dirty());
        let reopened = DedupTracker::open(&path, policy).await.unwrap();
        assert!(reopened.is_processed("x"));
    }

    #[tokio::test]
    async fn remarking_overwrites_the_entry() {
        let dir = tempdir().expect("tempdir");
        let mut tracker = seeded(dir.path(), TrackerPolicy::default()).await;
        tracker.mark_processed("d", done(ItemOutcome::Success)).await.unwrap();
        assert_eq!(tracker.entry("d").unwrap().outcome, ItemOutcome::Success);
        assert_eq!(tracker.stats().unique_items, 2);
    }

    #[tokio::test]
    async fn corrupt_tracker_fails_loudly() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("processed_items.json");
        std::fs::write(&path, b"not json").unwrap();
        let err = DedupTracker::open(&path, TrackerPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::LedgerCorruption { .. }));
    }

    #[test]
    fn flush_policy_parses_from_config_strings() {
        assert_eq!("per-item".parse::<FlushPolicy>(), Ok(FlushPolicy::PerItem));
        assert_eq!("RUN_END".parse::<FlushPolicy>(), Ok(FlushPolicy::RunEnd));
        assert!("sometimes".parse::<FlushPolicy>().is_err());
    }
}
