//! HTTP control surface.
//!
//! - `POST /start-workflows` launches a run
//! - `GET /run-status?runPrefix=X` aggregates a priority run
//! - `GET /run-status-fairness?runPrefix=X` aggregates a fairness run
//!
//! Errors are returned as `{"message": "..."}` with a status derived from
//! the [`RunError`](crate::error::RunError) kind.

pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::engine::ExecutionEngine;
use crate::launcher::Launcher;
use crate::model::Band;

/// Shared application state.
pub struct AppState {
    pub engine: Arc<dyn ExecutionEngine>,
    pub launcher: Launcher,
    /// Bands used when a fairness request names none.
    pub default_bands: Vec<Band>,
}

impl AppState {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        task_queue: impl Into<String>,
        default_bands: Vec<Band>,
    ) -> Self {
        Self {
            launcher: Launcher::new(Arc::clone(&engine), task_queue),
            engine,
            default_bands,
        }
    }
}

/// Builds the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/start-workflows", post(handlers::start_workflows))
        .route("/run-status", get(handlers::run_status))
        .route("/run-status-fairness", get(handlers::run_status_fairness))
        .with_state(state)
}

/// Serves until `shutdown` resolves, then shuts the engine down.
pub async fn serve<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(
        addr = %listener.local_addr()?,
        engine = state.engine.name(),
        "Control server listening"
    );

    axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Control server stopped, shutting down engine");
    state.engine.shutdown().await;
    Ok(())
}
