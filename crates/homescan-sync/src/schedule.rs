use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::runner::{RunOutcome, RunRequest, ScheduledRunner};

/// Scheduler that fires `request` on `cron`. Overlapping firings are serialized by
/// the run lock: a firing that finds the lock held ends as a busy no-op.
pub async fn build_scheduler(
    runner: ScheduledRunner,
    cron: &str,
    request: RunRequest,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let runner = runner.clone();
        let request = request.clone();
        Box::pin(async move {
            info!("scheduled run triggered");
            match runner.run(&request).await {
                Ok(RunOutcome::LockBusy { .. }) => warn!("scheduled run skipped; lock busy"),
                Ok(outcome) => info!(exit_code = outcome.exit_code(), "scheduled run finished"),
                Err(err) => error!(error = %err, "scheduled run failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}

/// Run the configured schedule in-process until Ctrl-C.
pub async fn serve_schedule(runner: ScheduledRunner) -> Result<()> {
    let cron = runner.config().schedule_cron.clone();
    let request = runner.default_request(false);
    let mut sched = build_scheduler(runner, &cron, request).await?;
    sched.start().await.context("starting scheduler")?;
    info!(cron = %cron, "scheduler running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("stopping scheduler");
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}
