//! Request handlers for the control surface.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::aggregate::{aggregate_fairness, aggregate_priority, FairnessRunResults, PriorityRunResults};
use crate::engine::ListFilter;
use crate::error::RunError;
use crate::launcher::LaunchReport;
use crate::model::{Band, ExecutionRecord, RunMode, RunRequest};
use crate::server::AppState;

/// Body of `POST /start-workflows`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowsRequest {
    pub workflow_id_prefix: String,
    #[serde(default)]
    pub number_of_workflows: u32,
    /// `"priority"` or `"fairness"`; absent or empty means fairness.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub bands: Vec<Band>,
    #[serde(default)]
    pub disable_fairness: bool,
}

impl StartWorkflowsRequest {
    /// Converts the wire request, substituting `default_bands` for a
    /// fairness request without bands.
    pub fn into_run_request(self, default_bands: &[Band]) -> Result<RunRequest, RunError> {
        let mode = match self.mode.as_deref().map(str::trim) {
            None | Some("") => RunMode::Fairness,
            Some(mode) => mode.parse::<RunMode>().map_err(RunError::config)?,
        };

        let bands = if mode == RunMode::Fairness && self.bands.is_empty() {
            default_bands.to_vec()
        } else {
            self.bands
        };

        Ok(RunRequest {
            id_prefix: self.workflow_id_prefix,
            total_jobs: self.number_of_workflows,
            mode,
            bands,
            disable_fairness: self.disable_fairness,
        })
    }
}

/// One failed submission in a [`StartWorkflowsResponse`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFailure {
    pub job_id: String,
    pub message: String,
}

/// Body returned by `POST /start-workflows`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowsResponse {
    pub run_prefix: String,
    pub mode: RunMode,
    pub submitted: usize,
    pub failed: usize,
    /// `"complete"` or `"partial"`.
    pub status: &'static str,
    pub window_seconds: u64,
    pub failures: Vec<SubmissionFailure>,
}

impl From<&LaunchReport> for StartWorkflowsResponse {
    fn from(report: &LaunchReport) -> Self {
        Self {
            run_prefix: report.run_prefix.clone(),
            mode: report.mode,
            submitted: report.submitted(),
            failed: report.failed(),
            status: if report.is_partial() { "partial" } else { "complete" },
            window_seconds: report.window.as_secs(),
            failures: report
                .failures()
                .map(|o| SubmissionFailure {
                    job_id: o.job_id.clone(),
                    message: o
                        .result
                        .as_ref()
                        .err()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Query string of the run-status endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusParams {
    #[serde(rename = "runPrefix")]
    pub run_prefix: Option<String>,
}

/// Error response: a status code and a `{"message": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        let status = match &err {
            RunError::Config { .. } => StatusCode::BAD_REQUEST,
            RunError::Parse { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RunError::Query { .. } | RunError::Submission { .. } => StatusCode::BAD_GATEWAY,
        };
        tracing::warn!(kind = err.kind(), error = %err, "Request failed");
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

/// Launch a run
pub async fn start_workflows(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartWorkflowsRequest>, JsonRejection>,
) -> Result<Json<StartWorkflowsResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = payload.into_run_request(&state.default_bands)?;
    let report = state.launcher.launch(&request).await?;
    Ok(Json(StartWorkflowsResponse::from(&report)))
}

/// Aggregate a priority run
pub async fn run_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatusParams>,
) -> Result<Json<PriorityRunResults>, ApiError> {
    let records = fetch_records(&state, params).await?;
    Ok(Json(aggregate_priority(&records)?))
}

/// Aggregate a fairness run
pub async fn run_status_fairness(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatusParams>,
) -> Result<Json<FairnessRunResults>, ApiError> {
    let records = fetch_records(&state, params).await?;
    Ok(Json(aggregate_fairness(&records)?))
}

async fn fetch_records(
    state: &AppState,
    params: StatusParams,
) -> Result<Vec<ExecutionRecord>, ApiError> {
    let prefix = match params.run_prefix {
        Some(prefix) if !prefix.is_empty() => prefix,
        _ => return Err(ApiError::bad_request("runPrefix query parameter is required")),
    };

    state
        .engine
        .query(&ListFilter::IdPrefix(prefix))
        .await
        .map_err(|source| ApiError::from(RunError::Query { source }))
}
