//! In-process execution engine with an optional simulated worker.
//!
//! [`MemoryEngine`] keeps every started execution in a `DashMap` keyed by job
//! id. Starting an id twice is rejected, the way a workflow service rejects
//! an already-started workflow id.
//!
//! Executions are kept until the engine is dropped. A long-lived process
//! that launches many runs should release finished ones with
//! [`MemoryEngine::remove_matching`].
//!
//! # Simulation
//!
//! With [`MemoryEngine::simulated`], each job waits out its start delay and
//! then runs [`STEP_COUNT`] steps of ~300ms, bumping the
//! `ActivitiesCompleted` attribute after each. At most five steps run at
//! once across all jobs. The step semaphore is fair, so waiting steps are
//! dispatched in arrival order; there is no priority or fairness ordering.
//!
//! Simulated jobs run on a [`TaskTracker`]; [`ExecutionEngine::shutdown`]
//! cancels them and waits for them to exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::attributes::ACTIVITIES_COMPLETED;
use crate::error::EngineError;
use crate::model::{ExecutionRecord, STEP_COUNT};

use super::{ExecutionEngine, ListFilter, SubmitRequest};

/// Default duration of one simulated step.
pub const DEFAULT_STEP_DURATION: Duration = Duration::from_millis(300);

/// Default cap on concurrently running simulated steps.
pub const DEFAULT_MAX_CONCURRENT_STEPS: usize = 5;

#[derive(Debug, Clone)]
struct StoredExecution {
    seq: u64,
    record: ExecutionRecord,
}

#[derive(Debug)]
struct Simulation {
    step_duration: Duration,
    steps: Arc<Semaphore>,
}

/// Thread-safe in-memory [`ExecutionEngine`].
#[derive(Debug)]
pub struct MemoryEngine {
    executions: Arc<DashMap<String, StoredExecution>>,
    next_seq: AtomicU64,
    simulation: Option<Simulation>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl MemoryEngine {
    /// An engine that records starts but never runs anything.
    ///
    /// Progress stays at 0 unless set with [`MemoryEngine::set_progress`].
    pub fn new() -> Self {
        Self {
            executions: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(0),
            simulation: None,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// An engine that simulates the five-step worker with default timings.
    pub fn simulated() -> Self {
        Self::new().with_simulation(DEFAULT_STEP_DURATION, DEFAULT_MAX_CONCURRENT_STEPS)
    }

    /// Enables simulation with the given step duration and concurrency cap.
    pub fn with_simulation(mut self, step_duration: Duration, max_concurrent_steps: usize) -> Self {
        self.simulation = Some(Simulation {
            step_duration,
            steps: Arc::new(Semaphore::new(max_concurrent_steps.max(1))),
        });
        self
    }

    /// Number of executions started.
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Returns `true` if nothing has been started.
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Snapshot of one execution.
    pub fn get(&self, job_id: &str) -> Option<ExecutionRecord> {
        self.executions.get(job_id).map(|e| e.record.clone())
    }

    /// Forgets every execution matching `filter` and returns how many were removed.
    ///
    /// A still-running simulated job keeps stepping but no longer records progress.
    pub fn remove_matching(&self, filter: &ListFilter) -> usize {
        let mut removed = 0;
        self.executions.retain(|id, _| {
            let keep = !filter.matches(id);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Overwrites a job's completed-steps counter. Returns `false` for unknown ids.
    pub fn set_progress(&self, job_id: &str, completed: usize) -> bool {
        match self.executions.get_mut(job_id) {
            Some(mut entry) => {
                entry
                    .record
                    .attributes
                    .insert(ACTIVITIES_COMPLETED.to_string(), completed.to_string());
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn submit(&self, request: SubmitRequest) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Connection {
                message: "engine has been shut down".to_string(),
            });
        }

        let record = request
            .attributes
            .iter()
            .fold(ExecutionRecord::new(&request.job_id), |r, (name, value)| {
                r.with_attribute(*name, value.to_string())
            });

        match self.executions.entry(request.job_id.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::Rejected {
                    message: format!("workflow execution already started: {}", request.job_id),
                });
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(StoredExecution { seq, record });
            }
        }

        if let Some(sim) = &self.simulation {
            self.tracker.spawn(run_steps(
                request.job_id,
                request.start_delay,
                sim.step_duration,
                Arc::clone(&sim.steps),
                Arc::clone(&self.executions),
                self.cancel.clone(),
            ));
        }

        Ok(())
    }

    async fn query(&self, filter: &ListFilter) -> Result<Vec<ExecutionRecord>, EngineError> {
        let mut matched: Vec<StoredExecution> = self
            .executions
            .iter()
            .filter(|entry| filter.matches(entry.key()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by_key(|e| e.seq);
        Ok(matched.into_iter().map(|e| e.record).collect())
    }

    async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!(executions = self.executions.len(), "Memory engine shut down");
    }
}

async fn run_steps(
    job_id: String,
    start_delay: Duration,
    step_duration: Duration,
    steps: Arc<Semaphore>,
    executions: Arc<DashMap<String, StoredExecution>>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(start_delay) => {}
    }

    for step in 1..=STEP_COUNT {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return,
            permit = Arc::clone(&steps).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(step_duration) => {}
        }
        drop(permit);

        if let Some(mut entry) = executions.get_mut(&job_id) {
            entry
                .record
                .attributes
                .insert(ACTIVITIES_COMPLETED.to_string(), step.to_string());
        }
        tracing::trace!(job_id = %job_id, step, "Simulated step completed");
    }
}
