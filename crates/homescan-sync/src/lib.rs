//! Run orchestration: configuration, the locked run state machine, status and
//! index maintenance, and the cron scheduler.

use anyhow::{Context, Result};
use tracing::warn;

mod config;
mod runner;
mod schedule;

pub use config::{SyncConfig, CONFIG_FILE_NAME, LOCATION_PLACEHOLDER};
pub use runner::{
    exit_code_for, Clock, FixedClock, ItemRunOutcome, RunAborted, RunError, RunHistorySummary,
    RunOutcome, RunReport, RunRequest, ScheduledRunner, SystemClock, EXIT_DEGRADED, EXIT_FATAL,
    EXIT_INTERRUPTED, EXIT_OK,
};
pub use schedule::{build_scheduler, serve_schedule};

pub const CRATE_NAME: &str = "homescan-sync";

/// Run once, giving up (and releasing the lock) on Ctrl-C.
pub async fn run_until_interrupted(
    runner: &ScheduledRunner,
    request: &RunRequest,
) -> Result<Option<Result<RunOutcome, RunAborted>>> {
    tokio::select! {
        result = runner.run(request) => Ok(Some(result)),
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            warn!("interrupted; abandoning run");
            Ok(None)
        }
    }
}

pub fn runner_from_env() -> Result<ScheduledRunner> {
    let config = SyncConfig::from_env().context("loading configuration")?;
    Ok(ScheduledRunner::from_config(config))
}
