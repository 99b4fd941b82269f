//! Run launcher: turns a [`RunRequest`] into one engine submission per job.
//!
//! Launching is fire-and-forget. The launcher validates the request,
//! classifies every job up front (one allocator call per fairness run), opens
//! the submission window once, then submits jobs sequentially in allocated
//! order. Each job's start delay is evaluated as it is submitted.
//!
//! A failed submission is recorded in the [`LaunchReport`] and logged; it
//! never stops the remaining jobs. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::allocator::{allocate, priority_for};
use crate::engine::{ExecutionEngine, SubmitRequest};
use crate::error::RunError;
use crate::model::{job_id, Band, Classification, JobDescriptor, RunMode, RunRequest};
use crate::schedule::SubmissionWindow;

/// Outcome of one job's submission.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: String,
    /// `Err` is always [`RunError::Submission`].
    pub result: Result<(), RunError>,
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-job results of a launch.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    /// Job id prefix of the run.
    pub run_prefix: String,
    /// Scenario kind.
    pub mode: RunMode,
    /// Length of the submission window the run used.
    pub window: Duration,
    /// One entry per job, in submission order.
    pub outcomes: Vec<JobOutcome>,
}

impl LaunchReport {
    /// Number of jobs the engine accepted.
    pub fn submitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Number of jobs whose submission failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.submitted()
    }

    /// Returns `true` if at least one submission failed.
    pub fn is_partial(&self) -> bool {
        self.failed() > 0
    }

    /// Failed outcomes, in submission order.
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }
}

/// Submits runs to an execution engine.
#[derive(Clone)]
pub struct Launcher {
    engine: Arc<dyn ExecutionEngine>,
    task_queue: String,
    seed: Option<u64>,
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("engine", &self.engine.name())
            .field("task_queue", &self.task_queue)
            .field("seed", &self.seed)
            .finish()
    }
}

impl Launcher {
    pub fn new(engine: Arc<dyn ExecutionEngine>, task_queue: impl Into<String>) -> Self {
        Self {
            engine,
            task_queue: task_queue.into(),
            seed: None,
        }
    }

    /// Seeds the exact-count shuffle for reproducible job order.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Launches every job of `request`.
    ///
    /// Returns `Err` only for [`RunError::Config`], before anything is
    /// submitted. Per-job failures are reported in the [`LaunchReport`].
    pub async fn launch(&self, request: &RunRequest) -> Result<LaunchReport, RunError> {
        request.validate()?;
        let classifications = self.classify(request)?;
        let window = SubmissionWindow::open(classifications.len() as u64, request.mode);

        tracing::info!(
            run_prefix = %request.id_prefix,
            mode = %request.mode,
            jobs = classifications.len(),
            window_secs = window.length().as_secs(),
            engine = self.engine.name(),
            "Launching run"
        );

        let mut outcomes = Vec::with_capacity(classifications.len());
        for (index, classification) in classifications.into_iter().enumerate() {
            let job = JobDescriptor {
                id: job_id(&request.id_prefix, index as u64 + 1),
                classification,
                submit_after: window.delay(),
            };
            let submit = SubmitRequest::for_job(&job, &self.task_queue, request.disable_fairness);

            let result = match self.engine.submit(submit).await {
                Ok(()) => {
                    tracing::debug!(
                        job_id = %job.id,
                        delay_ms = job.submit_after.as_millis() as u64,
                        "Submitted job"
                    );
                    Ok(())
                }
                Err(source) => {
                    tracing::warn!(
                        job_id = %job.id,
                        category = source.category(),
                        error = %source,
                        "Job submission failed"
                    );
                    Err(RunError::Submission {
                        job_id: job.id.clone(),
                        source,
                    })
                }
            };
            outcomes.push(JobOutcome {
                job_id: job.id,
                result,
            });
        }

        let report = LaunchReport {
            run_prefix: request.id_prefix.clone(),
            mode: request.mode,
            window: window.length(),
            outcomes,
        };
        tracing::info!(
            run_prefix = %report.run_prefix,
            submitted = report.submitted(),
            failed = report.failed(),
            "Run launched"
        );
        Ok(report)
    }

    /// Classifies every job of the run, in submission order.
    fn classify(&self, request: &RunRequest) -> Result<Vec<Classification>, RunError> {
        match request.mode {
            RunMode::Priority => Ok((1..=request.effective_total())
                .map(|n| Classification::Priority(priority_for(n)))
                .collect()),
            RunMode::Fairness => {
                let total = request.effective_total();
                let bands = match self.seed {
                    Some(seed) => allocate(&request.bands, total, &mut StdRng::seed_from_u64(seed))?,
                    None => allocate(&request.bands, total, &mut rand::rng())?,
                };
                Ok(bands
                    .into_iter()
                    .map(|band| fairness_class(band, request.disable_fairness))
                    .collect())
            }
        }
    }
}

fn fairness_class(band: &Band, disable_fairness: bool) -> Classification {
    Classification::Fairness {
        key: band.key.clone(),
        weight: if disable_fairness { 0 } else { band.weight },
    }
}
