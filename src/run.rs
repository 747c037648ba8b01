//! `run` command: drive a backend for a fixed time and report.

use crate::report::{format_progress, format_table, LoopStatus, RunReport};
use anyhow::Context;
use chrono::Utc;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use workload_core::duration::parse_duration;
use workload_core::{IdStrategy, WorkloadBackend, WorkloadConfig, WorkloadDriver};

/// Run length used when `--duration` is too short to be meaningful.
pub const DEFAULT_RUN_DURATION: Duration = Duration::from_secs(120);

/// Shortest run length accepted as given.
const MIN_RUN_DURATION: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Arguments shared by every backend.
#[derive(Args, Clone, Debug)]
pub struct CommonRunArgs {
    /// How long to run the workload (e.g. "90s", "5m", "1h"); values of 1s or less use the default
    #[arg(long, default_value = "2m", value_parser = parse_duration)]
    pub duration: Duration,

    /// How often to print progress
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub poll_interval: Duration,

    /// Workload profile (YAML or TOML); built-in defaults when omitted
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Where to write the JSON report
    #[arg(long, default_value = "report.json")]
    pub report: PathBuf,

    /// Override the id strategy of the profile
    #[arg(long, value_enum)]
    pub id_strategy: Option<IdStrategy>,

    /// Random seed for reproducible parameter draws
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Run length to use for a requested `--duration`.
pub fn effective_duration(requested: Duration) -> Duration {
    if requested <= MIN_RUN_DURATION {
        tracing::warn!(
            "Run duration {:?} is too short, using {:?}",
            requested,
            DEFAULT_RUN_DURATION
        );
        DEFAULT_RUN_DURATION
    } else {
        requested
    }
}

/// Load the profile and apply command-line overrides.
pub fn load_config(args: &CommonRunArgs) -> anyhow::Result<WorkloadConfig> {
    let mut config = match &args.config {
        Some(path) => WorkloadConfig::from_file(path)
            .with_context(|| format!("Failed to load workload config from {path:?}"))?,
        None => WorkloadConfig::default(),
    };
    if let Some(strategy) = args.id_strategy {
        config.insert.id_strategy = strategy;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

/// Drive `backend` for the configured time, print a summary and write the
/// report. Loop failures are reported, not returned as errors.
pub async fn run_workload(
    backend: Arc<dyn WorkloadBackend>,
    args: &CommonRunArgs,
) -> anyhow::Result<RunReport> {
    let config = load_config(args)?;
    let run_for = effective_duration(args.duration);
    let backend_name = backend.name().to_string();

    tracing::info!(
        "Running workload against {} for {:?} (report: {})",
        backend_name,
        run_for,
        args.report.display()
    );

    let mut driver = WorkloadDriver::new(backend, config.clone());
    let started_at = Utc::now();
    driver
        .start()
        .await
        .with_context(|| format!("Failed to start workload against {backend_name}"))?;

    let started = tokio::time::Instant::now();
    let deadline = started + run_for;
    let poll_interval = args.poll_interval.max(MIN_POLL_INTERVAL);
    let mut ticker = tokio::time::interval_at(started + poll_interval, poll_interval);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, stopping workload");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = driver.snapshot();
                print!(
                    "{}",
                    format_progress(&snapshot, started.elapsed(), driver.already_written())
                );
            }
        }
    }

    let exits = driver.stop().await;
    for exit in exits.iter().filter(|e| !e.is_ok()) {
        if let Err(e) = &exit.result {
            tracing::error!("{} loop failed: {}", exit.kind, e);
        }
    }

    let report = RunReport {
        backend: backend_name,
        started_at,
        finished_at: Utc::now(),
        config,
        loops: exits.iter().map(LoopStatus::from).collect(),
        snapshot: driver.snapshot(),
    };

    println!("{}", format_table(&report.snapshot, &report.loops));
    report.write_json(&args.report)?;
    tracing::info!("Report written to {}", args.report.display());

    Ok(report)
}
