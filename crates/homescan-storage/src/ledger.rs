//! Daily run history, persisted as one JSON document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use homescan_core::{RunHistoryEntry, RunStatus};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::atomic::write_atomic;
use crate::StorageError;

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    runs: Vec<RunHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub last_successful_run: Option<DateTime<Utc>>,
}

/// Append-only run history. Loaded whole, rewritten atomically on every append.
#[derive(Debug)]
pub struct RunLedger {
    path: PathBuf,
    runs: Vec<RunHistoryEntry>,
}

impl RunLedger {
    /// Load the ledger at `path`. A missing file is an empty history; anything
    /// unparsable is [`StorageError::LedgerCorruption`].
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let runs = match fs::read(&path).await {
            Ok(bytes) => parse_ledger(&path, &bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(StorageError::io("reading run history", &path)(err)),
        };
        Ok(Self { path, runs })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[RunHistoryEntry] {
        &self.runs
    }

    /// Whether a completed (success or partial success) run exists for `date`.
    pub fn was_run_on(&self, date: NaiveDate) -> bool {
        self.runs
            .iter()
            .any(|run| run.date == date && run.status.is_completed())
    }

    pub fn was_run_today(&self) -> bool {
        self.was_run_on(Local::now().date_naive())
    }

    /// Most recent entry written for `date`, whatever its status.
    pub fn latest_for(&self, date: NaiveDate) -> Option<&RunHistoryEntry> {
        self.runs.iter().rev().find(|run| run.date == date)
    }

    pub fn last(&self) -> Option<&RunHistoryEntry> {
        self.runs.last()
    }

    /// Append `entry` and persist. On a failed write the in-memory history is left
    /// as it was, matching the file.
    pub async fn record_run(&mut self, entry: RunHistoryEntry) -> Result<(), StorageError> {
        self.runs.push(entry);
        if let Err(err) = self.persist().await {
            self.runs.pop();
            return Err(err);
        }
        if let Some(entry) = self.runs.last() {
            info!(
                run_id = %entry.run_id,
                date = %entry.date,
                status = %entry.status,
                total_runs = self.runs.len(),
                "run history updated"
            );
        }
        Ok(())
    }

    pub fn stats(&self) -> LedgerStats {
        let count = |status: &[RunStatus]| {
            self.runs
                .iter()
                .filter(|r| status.contains(&r.status))
                .count()
        };
        LedgerStats {
            total: self.runs.len(),
            succeeded: count(&[RunStatus::Success, RunStatus::PartialSuccess]),
            failed: count(&[RunStatus::Failure]),
            skipped: count(&[RunStatus::Skipped]),
            last_run: self.runs.last().map(|r| r.finished_at),
            last_run_status: self.runs.last().map(|r| r.status),
            last_successful_run: self
                .runs
                .iter()
                .rev()
                .find(|r| r.status.is_completed())
                .map(|r| r.finished_at),
        }
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let doc = LedgerFile {
            version: LEDGER_VERSION,
            runs: self.runs.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|source| StorageError::Serialize {
            what: "run history",
            source,
        })?;
        write_atomic(&self.path, &bytes).await
    }
}

fn parse_ledger(path: &Path, bytes: &[u8]) -> Result<Vec<RunHistoryEntry>, StorageError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(StorageError::corrupt_ledger(path, "file is empty"));
    }
    let doc: LedgerFile =
        serde_json::from_slice(bytes).map_err(|err| StorageError::corrupt_ledger(path, err))?;
    if doc.version > LEDGER_VERSION {
        return Err(StorageError::corrupt_ledger(
            path,
            format!("unsupported ledger version {}", doc.version),
        ));
    }
    Ok(doc.runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn entry(date: NaiveDate, status: RunStatus) -> RunHistoryEntry {
        let at = Utc
            .from_utc_datetime(&date.and_hms_opt(6, 0, 0).unwrap());
        RunHistoryEntry {
            run_id: Uuid::new_v4(),
            date,
            status,
            items_attempted: 2,
            items_succeeded: 2,
            items_failed: 0,
            started_at: at,
            finished_at: at,
            query: "independent house for sale LB Nagar".into(),
            forced: false,
            index_rebuilt: true,
            error: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[tokio::test]
    async fn recorded_success_counts_for_its_date_only() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("run_history.json");
        let mut ledger = RunLedger::open(&path).await.expect("open");
        assert!(!ledger.was_run_on(day(14)));

        ledger.record_run(entry(day(14), RunStatus::Success)).await.expect("record");
        assert!(ledger.was_run_on(day(14)));
        assert!(!ledger.was_run_on(day(15)));

        let reopened = RunLedger::open(&path).await.expect("reopen");
        assert!(reopened.was_run_on(day(14)));
        assert_eq!(reopened.entries().len(), 1);
    }

    #[tokio::test]
    async fn failed_and_skipped_runs_do_not_count_as_ran() {
        let dir = tempdir().expect("tempdir");
        let mut ledger = RunLedger::open(dir.path().join("h.json")).await.unwrap();
        ledger.record_run(entry(day(3), RunStatus::Failure)).await.unwrap();
        ledger.record_run(entry(day(3), RunStatus::Skipped)).await.unwrap();
        assert!(!ledger.was_run_on(day(3)));

        ledger.record_run(entry(day(3), RunStatus::PartialSuccess)).await.unwrap();
        assert!(ledger.was_run_on(day(3)));
        assert_eq!(ledger.latest_for(day(3)).unwrap().status, RunStatus::PartialSuccess);

        let stats = ledger.stats();
        assert_eq!((stats.total, stats.succeeded, stats.failed, stats.skipped), (3, 1, 1, 1));
        assert_eq!(stats.last_run_status, Some(RunStatus::PartialSuccess));
    }

    #[tokio::test]
    async fn unparsable_history_is_reported_not_reset() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("run_history.json");
        std::fs::write(&path, b"{\"version\":1,\"runs\":[{\"date\":").unwrap();

        let err = RunLedger::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::LedgerCorruption { .. }));
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"{\"version\":1,\"runs\":[{\"date\":"
        );

        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            RunLedger::open(&path).await.unwrap_err(),
            StorageError::LedgerCorruption { .. }
        ));
    }

    #[tokio::test]
    async fn failed_append_leaves_memory_matching_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("blocked");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("child"), b"x").unwrap();

        let mut ledger = RunLedger {
            path: path.clone(),
            runs: Vec::new(),
        };
        assert!(ledger.record_run(entry(day(1), RunStatus::Success)).await.is_err());
        assert!(ledger.entries().is_empty());
    }
}
