//! Order history merger binary.
//!
//! Runs a single SCD2 merge of the staged order batch into the historized table and exits.
//! Failures worth retrying exit with [`EXIT_TEMPFAIL`] so a scheduler can rerun the job.

use std::process::ExitCode;

use ::config::shared::MergerConfig;
use scd::error::ScdError;
use telemetry::metrics::init_metrics;
use telemetry::tracing::init_tracing;
use tracing::{error, info};

use crate::config::load_merger_config;
use crate::core::start_merger;

mod config;
mod core;

/// Exit code for failures that may succeed when the run is repeated (`EX_TEMPFAIL`).
const EXIT_TEMPFAIL: u8 = 75;

fn main() -> ExitCode {
    let merger_config = match load_merger_config() {
        Ok(merger_config) => merger_config,
        Err(err) => {
            eprintln!("failed to load configuration: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let _log_flusher = match init_tracing(env!("CARGO_BIN_NAME")) {
        Ok(log_flusher) => log_flusher,
        Err(err) => {
            eprintln!("failed to initialize tracing: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(merger_config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            exit_code(&err)
        }
    }
}

fn run(merger_config: MergerConfig) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(merger_config))
}

async fn async_main(merger_config: MergerConfig) -> anyhow::Result<()> {
    if let Some(metrics_config) = &merger_config.metrics {
        init_metrics(metrics_config.port)?;
        info!(port = metrics_config.port, "metrics exporter listening");
    }

    let summary = start_merger(merger_config).await?;

    info!(
        inserted = summary.inserted,
        changed = summary.changed,
        unchanged = summary.unchanged,
        rejected = summary.rejected,
        dry_run = summary.dry_run,
        "order history merger finished"
    );

    Ok(())
}

/// Maps a run failure to the process exit code.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    if is_retryable(err) {
        ExitCode::from(EXIT_TEMPFAIL)
    } else {
        ExitCode::FAILURE
    }
}

fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(err) = err.downcast_ref::<ScdError>() {
        return err.is_retryable();
    }

    // Migrations fail this way when the database is unreachable.
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
    )
}
