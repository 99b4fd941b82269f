//! Execution engine seam: submitting jobs and listing their records.
//!
//! # Architecture
//!
//! The launcher and the status endpoints talk to the engine only through
//! [`ExecutionEngine`], held as an `Arc<dyn ExecutionEngine>` for the life of
//! the process and shut down explicitly.
//!
//! - [`HttpEngine`](crate::engine::http::HttpEngine) -- JSON-over-HTTP
//!   client for a Temporal-style workflow service.
//! - [`MemoryEngine`](crate::engine::memory::MemoryEngine) -- in-process
//!   engine that simulates the five-step worker. Used by tests and local runs.
//!
//! Engines do not order dispatch by priority or fairness here; the memory
//! engine dispatches in submission order, and the real service applies its
//! own policy.

pub mod http;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::attributes::{initial_attributes, AttributeValue};
use crate::error::EngineError;
use crate::model::{Classification, ExecutionRecord, JobDescriptor};

pub use http::HttpEngine;
pub use memory::MemoryEngine;

/// Workflow type started for priority-mode jobs.
pub const PRIORITY_WORKFLOW: &str = "priorityWorkflow";

/// Workflow type started for fairness-mode jobs.
pub const FAIRNESS_WORKFLOW: &str = "fairnessWorkflow";

/// One job start, ready to hand to an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    /// Unique job id.
    pub job_id: String,
    /// Queue the engine should dispatch the job on.
    pub task_queue: String,
    /// Workflow type name.
    pub workflow_type: &'static str,
    /// Workflow input argument.
    pub input: Value,
    /// Indexed attributes set at start.
    pub attributes: Vec<(&'static str, AttributeValue)>,
    /// How long the engine should hold the job before starting it.
    pub start_delay: Duration,
}

impl SubmitRequest {
    /// Builds the start request for a job descriptor.
    ///
    /// `disable_fairness` is forwarded to fairness workflows as an input
    /// flag; the descriptor's weight is expected to already be effective.
    pub fn for_job(job: &JobDescriptor, task_queue: &str, disable_fairness: bool) -> Self {
        let (workflow_type, input) = match &job.classification {
            Classification::Priority(priority) => {
                (PRIORITY_WORKFLOW, json!({ "priority": priority }))
            }
            Classification::Fairness { key, weight } => (
                FAIRNESS_WORKFLOW,
                json!({
                    "fairnessKey": key,
                    "fairnessWeight": f64::from(*weight),
                    "disableFairness": disable_fairness,
                }),
            ),
        };

        Self {
            job_id: job.id.clone(),
            task_queue: task_queue.to_string(),
            workflow_type,
            input,
            attributes: initial_attributes(&job.classification),
            start_delay: job.submit_after,
        }
    }
}

/// Which executions a query should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    /// Executions whose id starts with the given prefix.
    IdPrefix(String),
}

impl ListFilter {
    /// Renders the filter as a visibility query expression.
    pub fn to_query(&self) -> String {
        match self {
            Self::IdPrefix(prefix) => {
                let escaped = prefix.replace('\\', "\\\\").replace('"', "\\\"");
                format!("WorkflowId STARTS_WITH \"{escaped}\"")
            }
        }
    }

    /// Returns `true` if a job id matches the filter.
    pub fn matches(&self, job_id: &str) -> bool {
        match self {
            Self::IdPrefix(prefix) => job_id.starts_with(prefix.as_str()),
        }
    }
}

/// A durable execution backend.
///
/// Implementations must be thread-safe (`Send + Sync`); the server shares one
/// handle across all request handlers.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Starts one job. Returns once the engine has acknowledged the start;
    /// never waits for the job to run.
    async fn submit(&self, request: SubmitRequest) -> Result<(), EngineError>;

    /// Lists every execution matching `filter`, following pagination to the end.
    async fn query(&self, filter: &ListFilter) -> Result<Vec<ExecutionRecord>, EngineError>;

    /// Releases engine resources. The handle must not be used afterwards.
    async fn shutdown(&self) {}
}
