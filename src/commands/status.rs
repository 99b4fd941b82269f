//! `fairload status` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;

use fairload::aggregate::{aggregate, RunResults};
use fairload::engine::{ExecutionEngine, ListFilter};
use fairload::error::RunError;
use fairload::model::RunMode;
use fairload::summary::render_results;

use super::{build_engine, load_config, EngineKind, GlobalArgs};

/// Arguments of `fairload status`.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Job id prefix of the run
    #[arg(long)]
    pub prefix: String,

    /// Scenario kind of the run
    #[arg(long, value_enum, default_value_t = RunMode::Fairness)]
    pub mode: RunMode,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Poll every N seconds until every job has finished
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,
}

/// Execute the `status` command.
pub async fn execute(args: StatusArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    if global.engine == EngineKind::Memory {
        tracing::warn!("The memory engine only sees runs launched by this process");
    }
    let engine = build_engine(global.engine, &config)?;

    let outcome = match args.watch {
        Some(secs) => watch(engine.as_ref(), &args.prefix, args.mode, secs, args.json).await,
        None => fetch(engine.as_ref(), &args.prefix, args.mode)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|results| print_results(&results, &args.prefix, args.json)),
    };

    engine.shutdown().await;
    outcome
}

/// Queries the engine for a run and aggregates its records.
pub async fn fetch(
    engine: &dyn ExecutionEngine,
    prefix: &str,
    mode: RunMode,
) -> Result<RunResults, RunError> {
    let records = engine
        .query(&ListFilter::IdPrefix(prefix.to_string()))
        .await
        .map_err(|source| RunError::Query { source })?;
    aggregate(&records, mode)
}

/// Polls and prints a run until it completes or Ctrl+C is pressed.
pub async fn watch(
    engine: &dyn ExecutionEngine,
    prefix: &str,
    mode: RunMode,
    interval_secs: u64,
    json: bool,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Watch interrupted");
                return Ok(());
            }
        }

        let results = fetch(engine, prefix, mode)
            .await
            .with_context(|| format!("Failed to fetch status of run '{prefix}'"))?;
        print_results(&results, prefix, json)?;

        if results.is_complete() {
            return Ok(());
        }
    }
}

fn print_results(results: &RunResults, prefix: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        println!("{}", render_results(results, prefix, Local::now()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairload::engine::MemoryEngine;
    use fairload::launcher::Launcher;
    use fairload::model::{Band, RunRequest};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fetch_aggregates_launched_run() {
        let engine = Arc::new(MemoryEngine::new());
        Launcher::new(engine.clone(), "default")
            .launch(&RunRequest::fairness(
                "s",
                4,
                vec![Band::new("gold", 10), Band::new("silver", 1)],
            ))
            .await
            .unwrap();
        engine.set_progress("s-1", 5);

        let results = fetch(engine.as_ref(), "s", RunMode::Fairness).await.unwrap();
        assert_eq!(results.total_jobs(), 4);
        match results {
            RunResults::Fairness(r) => {
                assert_eq!(r.summaries[0].key, "gold");
                assert_eq!(r.summaries[0].steps.finished(), 1);
            }
            other => panic!("Expected fairness results, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_returns_when_run_completes() {
        let engine = Arc::new(MemoryEngine::simulated());
        Launcher::new(engine.clone(), "default")
            .launch(&RunRequest::priority("w", 3))
            .await
            .unwrap();

        watch(engine.as_ref(), "w", RunMode::Priority, 1, true)
            .await
            .unwrap();
        let results = fetch(engine.as_ref(), "w", RunMode::Priority).await.unwrap();
        assert!(results.is_complete());
        engine.shutdown().await;
    }
}
