//! Run requests, job descriptors, and execution records.
//!
//! A [`RunRequest`] describes one load-test run: how many jobs, under which
//! [`RunMode`], and (for fairness runs) which [`Band`]s. The launcher turns it
//! into one [`JobDescriptor`] per job; the engine later reports each job back
//! as an [`ExecutionRecord`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RunError;

/// Number of simulated steps every job runs through.
pub const STEP_COUNT: usize = 5;

/// Number of priority classes; priorities run from 1 (highest) to this value.
pub const PRIORITY_LEVELS: u8 = 5;

/// A named fairness class with a relative weight.
///
/// A nonzero `count` on any band switches the whole run into exact-count
/// mode, where the sum of counts replaces the requested job total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    /// Fairness key; preserved verbatim for grouping results.
    pub key: String,
    /// Relative dispatch weight, interpreted by the engine.
    pub weight: u32,
    /// Exact number of jobs for this band (0 = not specified).
    #[serde(default)]
    pub count: u32,
}

impl Band {
    /// Creates a band without an explicit count.
    pub fn new(key: impl Into<String>, weight: u32) -> Self {
        Self {
            key: key.into(),
            weight,
            count: 0,
        }
    }

    /// Sets an explicit job count for this band.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

impl FromStr for Band {
    type Err = String;

    /// Parses `key:weight` or `key:weight:count`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (key, weight, count) = match parts.as_slice() {
            [key, weight] => (*key, *weight, None),
            [key, weight, count] => (*key, *weight, Some(*count)),
            _ => return Err(format!("expected key:weight[:count], got '{s}'")),
        };
        if key.trim().is_empty() {
            return Err(format!("band key must not be empty in '{s}'"));
        }
        let weight = weight
            .parse::<u32>()
            .map_err(|e| format!("invalid weight in '{s}': {e}"))?;
        let count = match count {
            Some(c) => c
                .parse::<u32>()
                .map_err(|e| format!("invalid count in '{s}': {e}"))?,
            None => 0,
        };
        Ok(Band::new(key, weight).with_count(count))
    }
}

/// Scenario kind of a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Jobs cycle through priority classes 1..=5.
    Priority,
    /// Jobs are assigned weighted fairness bands.
    #[default]
    Fairness,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Priority => f.write_str("priority"),
            Self::Fairness => f.write_str("fairness"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority" => Ok(Self::Priority),
            "fairness" => Ok(Self::Fairness),
            other => Err(format!(
                "unknown mode '{other}', expected 'priority' or 'fairness'"
            )),
        }
    }
}

/// A validated description of one load-test run.
///
/// Construct it directly and call [`RunRequest::validate`] (the launcher
/// does so before any submission).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Prefix for job ids; job `n` is `"{id_prefix}-{n}"`.
    pub id_prefix: String,
    /// Requested number of jobs. Ignored in exact-count fairness runs.
    pub total_jobs: u32,
    /// Scenario kind.
    pub mode: RunMode,
    /// Fairness bands in declaration order. Not consulted in priority mode.
    pub bands: Vec<Band>,
    /// When set, every job carries an effective fairness weight of 0.
    pub disable_fairness: bool,
}

impl RunRequest {
    /// A priority run of `total_jobs` jobs.
    pub fn priority(id_prefix: impl Into<String>, total_jobs: u32) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            total_jobs,
            mode: RunMode::Priority,
            bands: Vec::new(),
            disable_fairness: false,
        }
    }

    /// A fairness run over `bands`.
    pub fn fairness(id_prefix: impl Into<String>, total_jobs: u32, bands: Vec<Band>) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            total_jobs,
            mode: RunMode::Fairness,
            bands,
            disable_fairness: false,
        }
    }

    /// Sets the disable-fairness flag.
    pub fn with_fairness_disabled(mut self, disabled: bool) -> Self {
        self.disable_fairness = disabled;
        self
    }

    /// Returns `true` if any band carries an explicit count.
    pub fn has_exact_counts(&self) -> bool {
        self.mode == RunMode::Fairness && self.count_total() > 0
    }

    /// Sum of all explicit band counts.
    pub fn count_total(&self) -> u64 {
        self.bands.iter().map(|b| u64::from(b.count)).sum()
    }

    /// Number of jobs the run will actually submit.
    ///
    /// Exact-count fairness runs use the sum of band counts; every other run
    /// uses `total_jobs`.
    pub fn effective_total(&self) -> u64 {
        if self.has_exact_counts() {
            self.count_total()
        } else {
            u64::from(self.total_jobs)
        }
    }

    /// Check the request before allocation.
    ///
    /// Checks:
    /// - the id prefix is not blank
    /// - fairness runs have at least one band, and every band has a key
    /// - the effective job total is greater than zero
    pub fn validate(&self) -> Result<(), RunError> {
        if self.id_prefix.trim().is_empty() {
            return Err(RunError::config("Job id prefix must not be empty"));
        }

        if self.mode == RunMode::Fairness {
            if self.bands.is_empty() {
                return Err(RunError::config(
                    "Fairness runs require at least one band",
                ));
            }
            if let Some(pos) = self.bands.iter().position(|b| b.key.trim().is_empty()) {
                return Err(RunError::config(format!(
                    "Band {} has an empty key",
                    pos + 1
                )));
            }
        }

        if self.effective_total() == 0 {
            return Err(RunError::config("Total jobs must be greater than 0"));
        }

        Ok(())
    }
}

/// Formats the id of job `n` (1-based) in a run.
pub fn job_id(prefix: &str, n: u64) -> String {
    format!("{prefix}-{n}")
}

/// How a job is classified for the engine and for result grouping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Priority class 1..=5.
    Priority(u8),
    /// Fairness band key and its effective weight.
    Fairness { key: String, weight: u32 },
}

/// Everything the engine needs to start one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Unique job id within the run.
    pub id: String,
    /// Priority or fairness classification.
    pub classification: Classification,
    /// How long the engine should hold the job before starting it.
    pub submit_after: Duration,
}

/// Snapshot of one job as reported by the engine's query interface.
///
/// Attribute values are kept as the engine's raw strings; the
/// [`attributes`](crate::attributes) codec parses them on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Job id.
    pub id: String,
    /// Indexed attribute values keyed by attribute name.
    pub attributes: BTreeMap<String, String>,
}

impl ExecutionRecord {
    /// Creates a record with no attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds or replaces an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns the raw value of an attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Per-step histogram of jobs that completed each step.
///
/// Index `i` counts jobs that completed step `i + 1`. A job that completed
/// `c` steps contributes to indices `0..c`, so the counts are non-increasing
/// in step index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepCounts([u64; STEP_COUNT]);

impl StepCounts {
    /// Records one job that completed `completed` steps (clamped to [`STEP_COUNT`]).
    pub fn record(&mut self, completed: usize) {
        for slot in self.0.iter_mut().take(completed) {
            *slot += 1;
        }
    }

    /// Jobs that completed step `step` (1-based). Out-of-range steps count 0.
    pub fn completed(&self, step: usize) -> u64 {
        step.checked_sub(1)
            .and_then(|i| self.0.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Jobs that completed every step.
    pub fn finished(&self) -> u64 {
        self.0[STEP_COUNT - 1]
    }

    /// Raw counts, step 1 first.
    pub fn as_array(&self) -> &[u64; STEP_COUNT] {
        &self.0
    }
}

impl From<[u64; STEP_COUNT]> for StepCounts {
    fn from(counts: [u64; STEP_COUNT]) -> Self {
        Self(counts)
    }
}
