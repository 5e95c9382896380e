use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use homescan_core::RecordKey;
use homescan_sync::{
    exit_code_for, run_until_interrupted, runner_from_env, serve_schedule, ItemRunOutcome,
    RunOutcome, RunRequest, EXIT_FATAL, EXIT_INTERRUPTED,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "homescan")]
#[command(about = "Home search ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process new candidates once, unless today's run already happened.
    Run {
        /// Search query used as-is.
        #[arg(long, conflicts_with = "location")]
        query: Option<String>,
        /// Location expanded through the configured query templates.
        #[arg(long, short)]
        location: Option<String>,
        #[arg(long)]
        max_items: Option<usize>,
        /// Run even if a run already completed today.
        #[arg(long)]
        force: bool,
    },
    /// Process one item by id or url, then refresh the index.
    Process {
        reference: String,
        /// Recorded as the search context of the stored record.
        #[arg(long, short)]
        location: Option<String>,
        /// Process again even if the item was already handled.
        #[arg(long, short)]
        force: bool,
    },
    /// Check that the data directory and configured adapters are usable.
    Check,
    /// Run history, tracker totals and index metadata.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Regenerate index.json and index.parquet from stored records.
    RebuildIndex,
    /// Stored records, newest first.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete one stored record and refresh the index.
    Remove {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        id: String,
    },
    /// Run on the configured cron schedule until Ctrl-C.
    Schedule,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    match dispatch(cli.command.unwrap_or(Commands::Run {
        query: None,
        location: None,
        max_items: None,
        force: false,
    }))
    .await
    {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn dispatch(command: Commands) -> Result<u8> {
    let runner = runner_from_env()?;

    match command {
        Commands::Run {
            query,
            location,
            max_items,
            force,
        } => {
            let config = runner.config();
            let max_items = max_items.unwrap_or(config.max_items);
            let request = match query {
                Some(query) => RunRequest::for_query(query, max_items, force),
                None => {
                    let location = location.unwrap_or_else(|| config.default_location.clone());
                    RunRequest::for_location(config, &location, max_items, force)
                }
            };
            if request.queries.is_empty() {
                bail!("no search queries configured");
            }

            let Some(result) = run_until_interrupted(&runner, &request).await? else {
                eprintln!("run interrupted");
                return Ok(EXIT_INTERRUPTED);
            };
            let code = exit_code_for(&result);
            match result {
                Ok(RunOutcome::Completed(report)) => {
                    println!(
                        "run {}: status={} attempted={} succeeded={} failed={} index_rebuilt={}",
                        report.run_id,
                        report.status,
                        report.attempted,
                        report.succeeded,
                        report.failed,
                        report.index.is_some()
                    );
                    if let Some(err) = report.index_error {
                        eprintln!("index rebuild failed: {err}");
                    }
                }
                Ok(RunOutcome::Skipped { date, .. }) => {
                    println!(
                        "already ran on {date}; use --force to run again \
                         (attempted=0 succeeded=0 failed=0)"
                    );
                }
                Ok(RunOutcome::LockBusy { holder }) => {
                    eprintln!(
                        "another run is active ({}); not starting \
                         (attempted=0 succeeded=0 failed=0)",
                        holder.as_deref().unwrap_or("holder unknown")
                    );
                }
                Err(err) => eprintln!("run failed: {err:#}"),
            }
            Ok(code)
        }
        Commands::Process {
            reference,
            location,
            force,
        } => {
            let outcome = runner
                .process_one(&reference, location.as_deref(), force)
                .await
                .with_context(|| format!("processing {reference}"))?;
            match &outcome {
                ItemRunOutcome::AlreadyProcessed { external_id } => {
                    println!("{external_id} was already processed; use --force to process again")
                }
                ItemRunOutcome::Stored {
                    key,
                    already_stored,
                    index,
                } => {
                    let note = if *already_stored { " (already on disk)" } else { "" };
                    println!(
                        "stored {key}{note}; index now has {} properties",
                        index.total_properties
                    );
                }
                ItemRunOutcome::Failed {
                    external_id,
                    kind,
                    message,
                } => eprintln!("{external_id} failed ({kind}): {message}"),
            }
            Ok(outcome.exit_code())
        }
        Commands::Check => {
            let checks = runner.check().await;
            for check in &checks {
                let mark = if check.ready { "ok" } else { "MISSING" };
                println!("{mark:>7}  {}  {}", check.component, check.detail);
            }
            if checks.iter().all(|c| c.ready) {
                Ok(0)
            } else {
                Ok(EXIT_FATAL)
            }
        }
        Commands::Status { json } => {
            let summary = runner.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(0);
            }
            let runs = &summary.runs;
            println!(
                "runs: total={} succeeded={} failed={} skipped={}",
                runs.total, runs.succeeded, runs.failed, runs.skipped
            );
            match (&runs.last_run, &runs.last_run_status) {
                (Some(at), Some(status)) => println!("last run: {at} ({status})"),
                _ => println!("last run: never"),
            }
            if let Some(at) = &runs.last_successful_run {
                println!("last successful run: {at}");
            }
            let items = &summary.items;
            println!(
                "items: tracked={} succeeded={} failed={}",
                items.unique_items, items.succeeded, items.failed
            );
            println!("stored records: {}", summary.stored_records);
            match &summary.index {
                Some(meta) => println!(
                    "index: {} properties, built {}",
                    meta.total_properties, meta.last_built
                ),
                None => println!("index: not built"),
            }
            if let Some(holder) = &summary.lock_holder {
                println!("lock: held ({holder})");
            }
            Ok(0)
        }
        Commands::RebuildIndex => {
            let report = runner.rebuild_index().await.context("rebuilding index")?;
            println!("index rebuilt: {} properties", report.total_properties);
            for file in &report.files {
                println!("  {} sha256={} bytes={}", file.path, file.sha256, file.bytes);
            }
            Ok(0)
        }
        Commands::List { limit } => {
            let records = runner.list_records(Some(limit)).await?;
            if records.is_empty() {
                println!("no stored records");
            }
            for record in records {
                let data = &record.extracted_data;
                let price = data
                    .price_amount()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let area = data
                    .location
                    .as_ref()
                    .and_then(|l| l.area.clone())
                    .unwrap_or_else(|| "-".to_string());
                let kind = data.property_type.map(|t| t.as_str()).unwrap_or("-");
                println!(
                    "{}  {}  {}  price={}  area={}  {}",
                    record.processing_info.ingestion_date,
                    record.item_info.external_id,
                    kind,
                    price,
                    area,
                    record.item_info.title
                );
            }
            Ok(0)
        }
        Commands::Remove { date, id } => {
            let key = RecordKey::new(date, id)?;
            let report = runner
                .remove_record(&key)
                .await
                .with_context(|| format!("removing {key}"))?;
            println!("removed {key}; index now has {} properties", report.total_properties);
            Ok(0)
        }
        Commands::Schedule => {
            if !runner.config().scheduler_enabled {
                bail!("scheduler is disabled; set scheduler_enabled or HOMESCAN_SCHEDULER_ENABLED");
            }
            serve_schedule(runner).await?;
            Ok(0)
        }
    }
}
