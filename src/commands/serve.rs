//! `fairload serve` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};

use fairload::server::{self, AppState};

use super::{build_engine, load_config, GlobalArgs};

/// Execute the `serve` command.
///
/// Runs the control surface until Ctrl+C, then shuts the engine down.
pub async fn execute(listen: Option<String>, global: &GlobalArgs) -> Result<()> {
    let mut config = load_config(global)?;
    if let Some(listen) = listen {
        config.server.listen = listen;
    }
    let addr = config.listen_addr().context("Invalid listen address")?;

    let engine = build_engine(global.engine, &config)?;
    let state = Arc::new(AppState::new(
        engine,
        config.engine.task_queue.clone(),
        config.fairness.default_bands.clone(),
    ));

    eprintln!("fairload control server on http://{addr}");
    eprintln!("Press Ctrl+C to stop");

    server::serve(state, addr, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::warn!(error = %e, "Unable to listen for Ctrl+C; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
