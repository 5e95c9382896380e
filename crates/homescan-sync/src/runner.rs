//! One pipeline run, start to finish, under the host-wide lock.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, Utc};
use futures::FutureExt;
use homescan_adapters::{
    candidate_from_reference, candidate_source_for, ensure_populated, item_processor_for,
    CandidateSource, ItemFailure, ItemProcessor, Readiness, SourceError,
};
use homescan_core::{
    Candidate, ItemOutcome, KeyError, ProcessedItemEntry, PropertyRecord, RecordKey,
    RunHistoryEntry, RunStatus,
};
use homescan_index::{
    read_index_metadata, rebuild_from_store, IndexError, IndexMetadata, IndexReport,
};
use homescan_storage::{
    sweep_temp_files, DataLayout, DedupTracker, LedgerStats, LockAttempt, LockGuard, RecordStore,
    RunLedger, SaveOutcome, StorageError, TrackerStats,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::SyncConfig;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FATAL: u8 = 1;
pub const EXIT_DEGRADED: u8 = 2;
pub const EXIT_INTERRUPTED: u8 = 130;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day used for the ledger and record keys.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock; its day is the UTC date of the current reading.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run lock: {0}")]
    Lock(#[source] StorageError),
    #[error("another run is active ({})", .holder.as_deref().unwrap_or("holder unknown"))]
    Busy { holder: Option<String> },
    #[error("item reference: {0}")]
    Reference(#[from] KeyError),
    #[error("run history: {0}")]
    Ledger(#[source] StorageError),
    #[error("processed-items tracker: {0}")]
    Tracker(#[source] StorageError),
    #[error("candidate source: {0}")]
    CandidateSource(#[from] SourceError),
    #[error("record store: {0}")]
    Storage(#[source] StorageError),
    #[error("index rebuild: {0}")]
    Index(#[from] IndexError),
}

impl RunError {
    pub fn exit_code(&self) -> u8 {
        EXIT_FATAL
    }
}

/// A run stopped by a fatal error, with the item counts it reached first.
#[derive(Debug, Error)]
#[error("{error} (attempted={attempted} succeeded={succeeded} failed={failed})")]
pub struct RunAborted {
    pub error: RunError,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunAborted {
    fn at(error: RunError, progress: &Progress) -> Self {
        Self {
            error,
            attempted: progress.attempted,
            succeeded: progress.succeeded,
            failed: progress.failed,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

impl From<RunError> for RunAborted {
    fn from(error: RunError) -> Self {
        Self::at(error, &Progress::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    AcquiringLock,
    LockFailed,
    CheckingHistory,
    Skipped,
    FetchingCandidates,
    Filtering,
    Processing,
    RebuildingIndex,
    RecordingHistory,
    ReleasingLock,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn enter(state: RunState) {
    debug!(%state, "runner state");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub queries: Vec<String>,
    pub max_items: usize,
    pub force: bool,
}

impl RunRequest {
    pub fn for_query(query: impl Into<String>, max_items: usize, force: bool) -> Self {
        Self {
            queries: vec![query.into()],
            max_items,
            force,
        }
    }

    pub fn for_location(config: &SyncConfig, location: &str, max_items: usize, force: bool) -> Self {
        Self {
            queries: config.queries_for(location),
            max_items,
            force,
        }
    }

    fn label(&self) -> String {
        self.queries.join(" | ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successes whose record was already on disk under today's key.
    pub already_stored: usize,
    pub index: Option<IndexReport>,
    pub index_error: Option<String>,
    pub entry: RunHistoryEntry,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    LockBusy { holder: Option<String> },
    Skipped { date: NaiveDate, recorded: bool },
    Completed(RunReport),
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::LockBusy { .. } => EXIT_FATAL,
            Self::Skipped { .. } => EXIT_OK,
            Self::Completed(report) if report.index_error.is_some() => EXIT_FATAL,
            Self::Completed(report) => match report.status {
                RunStatus::Success | RunStatus::Skipped => EXIT_OK,
                RunStatus::PartialSuccess | RunStatus::Failure => EXIT_DEGRADED,
            },
        }
    }
}

pub fn exit_code_for(result: &Result<RunOutcome, RunAborted>) -> u8 {
    match result {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => err.exit_code(),
    }
}

/// What happened to a single item processed outside a search run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemRunOutcome {
    /// Tracked from an earlier run; pass `force` to process it again.
    AlreadyProcessed { external_id: String },
    Stored {
        key: String,
        already_stored: bool,
        index: IndexReport,
    },
    Failed {
        external_id: String,
        kind: String,
        message: String,
    },
}

impl ItemRunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::AlreadyProcessed { .. } | Self::Stored { .. } => EXIT_OK,
            Self::Failed { .. } => EXIT_DEGRADED,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunHistorySummary {
    pub runs: LedgerStats,
    pub items: TrackerStats,
    pub index: Option<IndexMetadata>,
    pub stored_records: usize,
    pub lock_holder: Option<String>,
}

#[derive(Debug, Default)]
struct Progress {
    attempted: usize,
    succeeded: usize,
    failed: usize,
    already_stored: usize,
}

/// Why one item did not end in a stored record. Never aborts the loop.
#[derive(Debug)]
struct ItemError {
    kind: &'static str,
    message: String,
}

impl From<ItemFailure> for ItemError {
    fn from(failure: ItemFailure) -> Self {
        Self {
            kind: failure.kind(),
            message: failure.to_string(),
        }
    }
}

impl ItemError {
    fn storage(err: StorageError) -> Self {
        Self {
            kind: "storage",
            message: err.to_string(),
        }
    }

    fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            kind: "panic",
            message: format!("processor panicked: {message}"),
        }
    }
}

fn tracker_entry(
    result: &Result<SaveOutcome, ItemError>,
    processed_at: DateTime<Utc>,
) -> ProcessedItemEntry {
    match result {
        Ok(_) => ProcessedItemEntry {
            outcome: ItemOutcome::Success,
            processed_at,
            failure_kind: None,
            note: None,
        },
        Err(err) => ProcessedItemEntry {
            outcome: ItemOutcome::Failure,
            processed_at,
            failure_kind: Some(err.kind.to_string()),
            note: Some(err.message.clone()),
        },
    }
}

async fn sweep_stale_temp_files(dirs: &[&Path]) {
    for dir in dirs {
        if let Err(err) = sweep_temp_files(dir).await {
            warn!(dir = %dir.display(), error = %err, "could not sweep temp files");
        }
    }
}

#[derive(Clone)]
pub struct ScheduledRunner {
    config: SyncConfig,
    layout: DataLayout,
    source: Arc<dyn CandidateSource>,
    processor: Arc<dyn ItemProcessor>,
    clock: Arc<dyn Clock>,
}

impl ScheduledRunner {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn CandidateSource>,
        processor: Arc<dyn ItemProcessor>,
    ) -> Self {
        Self {
            layout: config.layout(),
            config,
            source,
            processor,
            clock: Arc::new(SystemClock),
        }
    }

    /// Runner wired to the adapters named in `config`.
    pub fn from_config(config: SyncConfig) -> Self {
        let source = Arc::from(candidate_source_for(&config.candidate_source));
        let processor = Arc::from(item_processor_for(&config.item_processor));
        Self::new(config, source, processor)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn default_request(&self, force: bool) -> RunRequest {
        RunRequest::for_location(
            &self.config,
            &self.config.default_location,
            self.config.max_items,
            force,
        )
    }

    /// Execute one run. Dropping the returned future releases the lock.
    pub async fn run(&self, request: &RunRequest) -> Result<RunOutcome, RunAborted> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, force = request.force);
        self.run_inner(run_id, request).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, request: &RunRequest) -> Result<RunOutcome, RunAborted> {
        enter(RunState::Idle);
        enter(RunState::AcquiringLock);
        let lock = self.layout.run_lock();
        let mut guard = match lock.try_acquire().map_err(RunError::Lock)? {
            LockAttempt::Acquired(guard) => guard,
            LockAttempt::Busy { holder } => {
                enter(RunState::LockFailed);
                warn!(
                    lock = %lock.path().display(),
                    holder = holder.as_deref().unwrap_or("unknown"),
                    "another run holds the lock; exiting"
                );
                return Ok(RunOutcome::LockBusy { holder });
            }
        };

        self.sweep().await;
        let result = self.run_locked(run_id, request).await;

        enter(RunState::ReleasingLock);
        guard.release();
        enter(RunState::Done);
        result
    }

    async fn run_locked(&self, run_id: Uuid, request: &RunRequest) -> Result<RunOutcome, RunAborted> {
        let started_at = self.clock.now();
        let today = self.clock.today();

        enter(RunState::CheckingHistory);
        let mut ledger = RunLedger::open(self.layout.run_history())
            .await
            .map_err(RunError::Ledger)?;

        if !request.force && ledger.was_run_on(today) {
            enter(RunState::Skipped);
            info!(
                date = %today,
                attempted = 0,
                succeeded = 0,
                failed = 0,
                "already ran today; skipping"
            );
            let recorded = self.config.record_skipped_runs;
            if recorded {
                let progress = Progress::default();
                let entry =
                    self.entry(run_id, today, request, RunStatus::Skipped, &progress, started_at);
                ledger.record_run(entry).await.map_err(RunError::Ledger)?;
            }
            return Ok(RunOutcome::Skipped {
                date: today,
                recorded,
            });
        }

        let mut progress = Progress::default();
        match self
            .process(run_id, today, request, started_at, &mut ledger, &mut progress)
            .await
        {
            Ok(report) => Ok(RunOutcome::Completed(report)),
            Err(err) => {
                error!(
                    error = %err,
                    attempted = progress.attempted,
                    succeeded = progress.succeeded,
                    failed = progress.failed,
                    "run aborted"
                );
                if !matches!(err, RunError::Ledger(_)) {
                    let mut entry = self.entry(
                        run_id,
                        today,
                        request,
                        RunStatus::Failure,
                        &progress,
                        started_at,
                    );
                    entry.error = Some(err.to_string());
                    if let Err(record_err) = ledger.record_run(entry).await {
                        warn!(error = %record_err, "could not record aborted run");
                    }
                }
                Err(RunAborted::at(err, &progress))
            }
        }
    }

    async fn process(
        &self,
        run_id: Uuid,
        today: NaiveDate,
        request: &RunRequest,
        started_at: DateTime<Utc>,
        ledger: &mut RunLedger,
        progress: &mut Progress,
    ) -> Result<RunReport, RunError> {
        enter(RunState::FetchingCandidates);
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for query in &request.queries {
            let found = self.source.find(query, request.max_items).await?;
            debug!(query = %query, found = found.len(), source = self.source.name(), "candidates fetched");
            candidates.extend(
                found
                    .into_iter()
                    .filter(|c| seen.insert(c.external_id.clone())),
            );
        }

        enter(RunState::Filtering);
        let mut tracker =
            DedupTracker::open(self.layout.processed_items(), self.config.tracker_policy())
                .await
                .map_err(RunError::Tracker)?;
        let found = candidates.len();
        let mut pending = tracker.retain_unprocessed_by(candidates, |c| c.external_id.as_str());
        pending.truncate(request.max_items);
        info!(found, pending = pending.len(), "candidates filtered");

        enter(RunState::Processing);
        let store = self.layout.record_store();
        let label = request.label();
        for candidate in &pending {
            progress.attempted += 1;
            let id = candidate.external_id.as_str();
            let result = self
                .process_item_isolated(&store, candidate, run_id, &label, today)
                .await;
            let entry = tracker_entry(&result, self.clock.now());
            match result {
                Ok(outcome) => {
                    progress.succeeded += 1;
                    if outcome == SaveOutcome::AlreadyStored {
                        progress.already_stored += 1;
                    }
                    info!(id, ?outcome, "item stored");
                }
                Err(err) => {
                    progress.failed += 1;
                    warn!(id, kind = err.kind, error = %err.message, "item failed");
                }
            }
            tracker
                .mark_processed(id, entry)
                .await
                .map_err(RunError::Tracker)?;
        }
        tracker.flush().await.map_err(RunError::Tracker)?;

        let items_status =
            RunStatus::classify(progress.attempted, progress.succeeded, progress.failed);

        enter(RunState::RebuildingIndex);
        let (index, index_error) = match rebuild_from_store(
            &store,
            &self.layout.index_json(),
            &self.layout.index_table(),
            self.clock.now(),
        )
        .await
        {
            Ok(report) => (Some(report), None),
            Err(err) => {
                error!(error = %err, "index rebuild failed; stored records are kept");
                (None, Some(err.to_string()))
            }
        };
        // Without a fresh index the day does not count as done; the next run retries.
        let status = if index.is_some() {
            items_status
        } else {
            RunStatus::Failure
        };

        enter(RunState::RecordingHistory);
        let mut entry = self.entry(run_id, today, request, status, progress, started_at);
        entry.index_rebuilt = index.is_some();
        entry.error = index_error.clone();
        ledger
            .record_run(entry.clone())
            .await
            .map_err(RunError::Ledger)?;

        match status {
            RunStatus::Success => info!(
                attempted = progress.attempted,
                succeeded = progress.succeeded,
                failed = progress.failed,
                %status,
                "run finished"
            ),
            _ => warn!(
                attempted = progress.attempted,
                succeeded = progress.succeeded,
                failed = progress.failed,
                %status,
                index_rebuilt = index.is_some(),
                "run finished with failures"
            ),
        }

        Ok(RunReport {
            run_id,
            status,
            attempted: progress.attempted,
            succeeded: progress.succeeded,
            failed: progress.failed,
            already_stored: progress.already_stored,
            index,
            index_error,
            entry,
        })
    }

    /// [`Self::process_item`] with a panicking processor turned into an item failure.
    async fn process_item_isolated(
        &self,
        store: &RecordStore,
        candidate: &Candidate,
        run_id: Uuid,
        query: &str,
        today: NaiveDate,
    ) -> Result<SaveOutcome, ItemError> {
        AssertUnwindSafe(self.process_item(store, candidate, run_id, query, today))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(ItemError::panicked(payload)))
    }

    async fn process_item(
        &self,
        store: &RecordStore,
        candidate: &Candidate,
        run_id: Uuid,
        query: &str,
        today: NaiveDate,
    ) -> Result<SaveOutcome, ItemError> {
        let key = RecordKey::new(today, candidate.external_id.clone()).map_err(|err| ItemError {
            kind: "invalid_id",
            message: err.to_string(),
        })?;
        if store.exists(&key).await.map_err(ItemError::storage)? {
            debug!(%key, "record already on disk; not reprocessing");
            return Ok(SaveOutcome::AlreadyStored);
        }

        debug!(id = %candidate.external_id, processor = self.processor.name(), "processing item");
        let item = self.processor.process(candidate).await?;
        let item = ensure_populated(&candidate.external_id, item)?;
        let record = PropertyRecord::assemble(candidate, item, run_id, query, self.clock.now(), today);
        store.save(&record).await.map_err(ItemError::storage)
    }

    fn entry(
        &self,
        run_id: Uuid,
        date: NaiveDate,
        request: &RunRequest,
        status: RunStatus,
        progress: &Progress,
        started_at: DateTime<Utc>,
    ) -> RunHistoryEntry {
        RunHistoryEntry {
            run_id,
            date,
            status,
            items_attempted: progress.attempted,
            items_succeeded: progress.succeeded,
            items_failed: progress.failed,
            started_at,
            finished_at: self.clock.now(),
            query: request.label(),
            forced: request.force,
            index_rebuilt: false,
            error: None,
        }
    }

    pub async fn status(&self) -> Result<RunHistorySummary, RunError> {
        let ledger = RunLedger::open(self.layout.run_history())
            .await
            .map_err(RunError::Ledger)?;
        let tracker =
            DedupTracker::open(self.layout.processed_items(), self.config.tracker_policy())
                .await
                .map_err(RunError::Tracker)?;
        let index = read_index_metadata(&self.layout.index_json()).await?;
        let stored_records = self
            .layout
            .record_store()
            .keys()
            .await
            .map_err(RunError::Storage)?
            .len();
        Ok(RunHistorySummary {
            runs: ledger.stats(),
            items: tracker.stats(),
            index,
            stored_records,
            lock_holder: self.layout.run_lock().holder(),
        })
    }

    /// Process one item named by id or url outside a search run, then refresh the index.
    ///
    /// A tracked id is left alone unless `force` is set; a forced item is stored under
    /// today's key, next to any record from an earlier day. No run history is written.
    pub async fn process_one(
        &self,
        reference: &str,
        location: Option<&str>,
        force: bool,
    ) -> Result<ItemRunOutcome, RunError> {
        let span = info_span!("process_one", reference, force);
        self.process_one_inner(reference, location, force)
            .instrument(span)
            .await
    }

    async fn process_one_inner(
        &self,
        reference: &str,
        location: Option<&str>,
        force: bool,
    ) -> Result<ItemRunOutcome, RunError> {
        let _guard = self.exclusive()?;
        self.sweep().await;

        let candidate = match self.source.lookup(reference).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => candidate_from_reference(reference)?,
            Err(err) => {
                warn!(error = %err, "candidate lookup failed; using the bare reference");
                candidate_from_reference(reference)?
            }
        };
        let id = candidate.external_id.clone();

        let mut tracker =
            DedupTracker::open(self.layout.processed_items(), self.config.tracker_policy())
                .await
                .map_err(RunError::Tracker)?;
        if !force && tracker.is_processed(&id) {
            info!(id = %id, "already processed; use force to process again");
            return Ok(ItemRunOutcome::AlreadyProcessed { external_id: id });
        }

        let today = self.clock.today();
        let store = self.layout.record_store();
        let query = location.unwrap_or_default();
        let result = self
            .process_item_isolated(&store, &candidate, Uuid::new_v4(), query, today)
            .await;
        tracker
            .mark_processed(&id, tracker_entry(&result, self.clock.now()))
            .await
            .map_err(RunError::Tracker)?;
        tracker.flush().await.map_err(RunError::Tracker)?;

        match result {
            Ok(saved) => {
                let key = RecordKey::new(today, id.clone())?;
                info!(%key, ?saved, "item stored");
                let index = self.rebuild_index_locked().await?;
                Ok(ItemRunOutcome::Stored {
                    key: key.to_string(),
                    already_stored: saved == SaveOutcome::AlreadyStored,
                    index,
                })
            }
            Err(err) => {
                warn!(id = %id, kind = err.kind, error = %err.message, "item failed");
                Ok(ItemRunOutcome::Failed {
                    external_id: id,
                    kind: err.kind.to_string(),
                    message: err.message,
                })
            }
        }
    }

    /// Probe the data directory and both configured collaborators.
    pub async fn check(&self) -> Vec<Readiness> {
        let data_dir = self.layout.data_dir();
        let storage = match tokio::fs::create_dir_all(data_dir).await {
            Ok(()) => Readiness::ready("data directory", data_dir.display().to_string()),
            Err(err) => {
                Readiness::missing("data directory", format!("{}: {err}", data_dir.display()))
            }
        };
        vec![storage, self.source.check().await, self.processor.check().await]
    }

    /// Regenerate both index files from the record store.
    pub async fn rebuild_index(&self) -> Result<IndexReport, RunError> {
        let _guard = self.exclusive()?;
        self.rebuild_index_locked().await
    }

    async fn rebuild_index_locked(&self) -> Result<IndexReport, RunError> {
        let report = rebuild_from_store(
            &self.layout.record_store(),
            &self.layout.index_json(),
            &self.layout.index_table(),
            self.clock.now(),
        )
        .await?;
        Ok(report)
    }

    /// Hold the run lock for a maintenance operation; fails at once if a run is active.
    fn exclusive(&self) -> Result<LockGuard, RunError> {
        match self.layout.run_lock().try_acquire().map_err(RunError::Lock)? {
            LockAttempt::Acquired(guard) => Ok(guard),
            LockAttempt::Busy { holder } => Err(RunError::Busy { holder }),
        }
    }

    /// Only called with the run lock held.
    async fn sweep(&self) {
        let properties = self.layout.properties_dir();
        sweep_stale_temp_files(&[self.layout.data_dir(), properties.as_path()]).await;
    }

    /// Stored records, newest ingestion date first.
    pub async fn list_records(&self, limit: Option<usize>) -> Result<Vec<PropertyRecord>, RunError> {
        let store = self.layout.record_store();
        let mut keys = store.keys().await.map_err(RunError::Storage)?;
        keys.reverse();
        if let Some(limit) = limit {
            keys.truncate(limit);
        }
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            records.push(store.load(&key).await.map_err(RunError::Storage)?);
        }
        Ok(records)
    }

    /// Delete one stored record and regenerate the index without it.
    pub async fn remove_record(&self, key: &RecordKey) -> Result<IndexReport, RunError> {
        let _guard = self.exclusive()?;
        self.layout
            .record_store()
            .delete(key)
            .await
            .map_err(RunError::Storage)?;
        info!(%key, "record removed");
        self.rebuild_index_locked().await
    }
}
