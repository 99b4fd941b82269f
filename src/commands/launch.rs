//! `fairload launch` command implementation.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Args;

use fairload::launcher::Launcher;
use fairload::model::{Band, RunMode, RunRequest};
use fairload::server::handlers::StartWorkflowsResponse;
use fairload::summary::render_launch;

use super::{build_engine, load_config, status, GlobalArgs};

/// Arguments of `fairload launch`.
#[derive(Debug, Args)]
pub struct LaunchArgs {
    /// Job id prefix (default: Test-MMDD-HHMMSS)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Number of jobs; ignored when any band carries a count
    #[arg(long, default_value_t = 100)]
    pub jobs: u32,

    /// Scenario kind
    #[arg(long, value_enum, default_value_t = RunMode::Fairness)]
    pub mode: RunMode,

    /// Fairness band as key:weight or key:weight:count (repeatable)
    #[arg(long = "band", value_name = "KEY:WEIGHT[:COUNT]")]
    pub bands: Vec<Band>,

    /// Send an effective fairness weight of 0 for every job
    #[arg(long)]
    pub disable_fairness: bool,

    /// Seed for the exact-count shuffle
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the launch report as JSON
    #[arg(long)]
    pub json: bool,

    /// After launching, poll every N seconds until every job has finished
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,
}

impl LaunchArgs {
    /// Builds the run request, falling back to `default_bands` for a
    /// fairness run without `--band`.
    fn into_run_request(self, default_bands: &[Band], now: DateTime<Local>) -> RunRequest {
        let bands = if self.mode == RunMode::Fairness && self.bands.is_empty() {
            default_bands.to_vec()
        } else {
            self.bands
        };
        RunRequest {
            id_prefix: self.prefix.unwrap_or_else(|| default_prefix(now)),
            total_jobs: self.jobs,
            mode: self.mode,
            bands,
            disable_fairness: self.disable_fairness,
        }
    }
}

fn default_prefix(now: DateTime<Local>) -> String {
    format!("Test-{}", now.format("%m%d-%H%M%S"))
}

/// Execute the `launch` command.
///
/// Exits with an error when any submission failed, after printing the report.
pub async fn execute(args: LaunchArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let engine = build_engine(global.engine, &config)?;

    let json = args.json;
    let watch = args.watch;
    let seed = args.seed;
    let request = args.into_run_request(&config.fairness.default_bands, Local::now());

    let mut launcher = Launcher::new(engine.clone(), config.engine.task_queue.clone());
    if let Some(seed) = seed {
        launcher = launcher.with_seed(seed);
    }

    let report = launcher
        .launch(&request)
        .await
        .with_context(|| format!("Failed to launch run '{}'", request.id_prefix))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&StartWorkflowsResponse::from(&report))?
        );
    } else {
        println!("{}", render_launch(&report, engine.name()));
    }

    let watched = match watch {
        Some(secs) => {
            status::watch(engine.as_ref(), &request.id_prefix, request.mode, secs, json).await
        }
        None => Ok(()),
    };
    engine.shutdown().await;
    watched?;

    if report.is_partial() {
        anyhow::bail!(
            "{} of {} submissions failed",
            report.failed(),
            report.outcomes.len()
        );
    }
    Ok(())
}
