//! Result aggregation: execution records to per-class step histograms.
//!
//! Aggregation is all-or-nothing. A single record with a missing or
//! malformed attribute fails the whole call with [`RunError::Parse`]; no
//! partial summary is ever returned.
//!
//! The result types serialize to the JSON shape the run-status endpoints
//! return (`workflowsByPriority` / `workflowsByFairness`).

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::attributes::{parse_fairness, parse_priority, parse_progress};
use crate::error::RunError;
use crate::model::{ExecutionRecord, RunMode, StepCounts, PRIORITY_LEVELS};

/// Progress of all jobs in one priority class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrioritySummary {
    #[serde(rename = "workflowPriority")]
    pub priority: u8,
    #[serde(rename = "numberOfWorkflows")]
    pub job_count: u64,
    #[serde(rename = "activities", serialize_with = "serialize_steps")]
    pub steps: StepCounts,
}

/// Progress of all jobs in one fairness band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FairnessSummary {
    #[serde(rename = "fairnessKey")]
    pub key: String,
    #[serde(rename = "fairnessWeight")]
    pub weight: u32,
    #[serde(rename = "numberOfWorkflows")]
    pub job_count: u64,
    #[serde(rename = "activities", serialize_with = "serialize_steps")]
    pub steps: StepCounts,
}

impl FairnessSummary {
    fn empty(key: String, weight: u32) -> Self {
        Self {
            key,
            weight,
            job_count: 0,
            steps: StepCounts::default(),
        }
    }
}

/// Aggregated progress of a priority run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityRunResults {
    /// Exactly one entry per priority, 1 first.
    #[serde(rename = "workflowsByPriority")]
    pub summaries: Vec<PrioritySummary>,
    /// Number of records aggregated.
    #[serde(rename = "totalWorkflowsInTest")]
    pub total_jobs: u64,
}

/// Aggregated progress of a fairness run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FairnessRunResults {
    /// One entry per observed (key, weight) pair, heaviest first.
    #[serde(rename = "workflowsByFairness")]
    pub summaries: Vec<FairnessSummary>,
    /// Number of records aggregated.
    #[serde(rename = "totalWorkflowsInTest")]
    pub total_jobs: u64,
}

/// Results of either run mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RunResults {
    Priority(PriorityRunResults),
    Fairness(FairnessRunResults),
}

impl RunResults {
    /// Number of records aggregated.
    pub fn total_jobs(&self) -> u64 {
        match self {
            Self::Priority(r) => r.total_jobs,
            Self::Fairness(r) => r.total_jobs,
        }
    }

    /// Returns `true` once every job has completed every step.
    ///
    /// An empty run is never complete; its jobs may not be visible yet.
    pub fn is_complete(&self) -> bool {
        let buckets: Vec<(u64, &StepCounts)> = match self {
            Self::Priority(r) => r.summaries.iter().map(|s| (s.job_count, &s.steps)).collect(),
            Self::Fairness(r) => r.summaries.iter().map(|s| (s.job_count, &s.steps)).collect(),
        };
        self.total_jobs() > 0
            && buckets
                .iter()
                .all(|(jobs, steps)| steps.finished() == *jobs)
    }
}

/// Aggregates records according to the run mode.
pub fn aggregate(records: &[ExecutionRecord], mode: RunMode) -> Result<RunResults, RunError> {
    match mode {
        RunMode::Priority => aggregate_priority(records).map(RunResults::Priority),
        RunMode::Fairness => aggregate_fairness(records).map(RunResults::Fairness),
    }
}

/// Groups records into the five priority classes.
///
/// All five buckets are always present, empty ones with a job count of 0.
pub fn aggregate_priority(records: &[ExecutionRecord]) -> Result<PriorityRunResults, RunError> {
    let mut summaries: Vec<PrioritySummary> = (1..=PRIORITY_LEVELS)
        .map(|priority| PrioritySummary {
            priority,
            job_count: 0,
            steps: StepCounts::default(),
        })
        .collect();

    for record in records {
        let priority = parse_priority(record)?;
        let completed = parse_progress(record)?;
        let bucket = &mut summaries[usize::from(priority - 1)];
        bucket.job_count += 1;
        bucket.steps.record(completed);
    }

    Ok(PriorityRunResults {
        summaries,
        total_jobs: records.len() as u64,
    })
}

/// Groups records by (fairness key, weight).
///
/// The same key under two different weights yields two buckets. Output is
/// sorted by descending weight; equal weights keep first-seen order.
pub fn aggregate_fairness(records: &[ExecutionRecord]) -> Result<FairnessRunResults, RunError> {
    let mut buckets: IndexMap<(String, u32), FairnessSummary> = IndexMap::new();

    for record in records {
        let (key, weight) = parse_fairness(record)?;
        let completed = parse_progress(record)?;
        let bucket = buckets
            .entry((key.clone(), weight))
            .or_insert_with(|| FairnessSummary::empty(key, weight));
        bucket.job_count += 1;
        bucket.steps.record(completed);
    }

    let mut summaries: Vec<FairnessSummary> = buckets.into_values().collect();
    summaries.sort_by(|a, b| b.weight.cmp(&a.weight));

    Ok(FairnessRunResults {
        summaries,
        total_jobs: records.len() as u64,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityCount {
    activity_number: usize,
    number_completed: u64,
}

fn serialize_steps<S: Serializer>(steps: &StepCounts, serializer: S) -> Result<S::Ok, S::Error> {
    let activities: Vec<ActivityCount> = steps
        .as_array()
        .iter()
        .enumerate()
        .map(|(i, &number_completed)| ActivityCount {
            activity_number: i + 1,
            number_completed,
        })
        .collect();
    activities.serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{ACTIVITIES_COMPLETED, FAIRNESS_KEY, FAIRNESS_WEIGHT, PRIORITY};
    use pretty_assertions::assert_eq;

    fn priority_record(id: &str, priority: u8, completed: usize) -> ExecutionRecord {
        ExecutionRecord::new(id)
            .with_attribute(PRIORITY, priority.to_string())
            .with_attribute(ACTIVITIES_COMPLETED, completed.to_string())
    }

    fn fairness_record(id: &str, key: &str, weight: u32, completed: usize) -> ExecutionRecord {
        ExecutionRecord::new(id)
            .with_attribute(FAIRNESS_KEY, format!("\"{key}\""))
            .with_attribute(FAIRNESS_WEIGHT, weight.to_string())
            .with_attribute(ACTIVITIES_COMPLETED, completed.to_string())
    }

    #[test]
    fn test_priority_buckets_always_present() {
        let results = aggregate_priority(&[]).unwrap();
        assert_eq!(results.total_jobs, 0);
        let priorities: Vec<u8> = results.summaries.iter().map(|s| s.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4, 5]);
        assert!(results.summaries.iter().all(|s| s.job_count == 0));
    }

    #[test]
    fn test_priority_grouping_and_histogram() {
        let records = vec![
            priority_record("t-1", 1, 5),
            priority_record("t-2", 2, 3),
            priority_record("t-6", 1, 1),
            priority_record("t-3", 3, 0),
        ];
        let results = aggregate_priority(&records).unwrap();
        assert_eq!(results.total_jobs, 4);
        assert_eq!(results.summaries[0].job_count, 2);
        assert_eq!(results.summaries[0].steps.as_array(), &[2, 1, 1, 1, 1]);
        assert_eq!(results.summaries[1].steps.as_array(), &[1, 1, 1, 0, 0]);
        assert_eq!(results.summaries[2].job_count, 1);
        assert_eq!(results.summaries[2].steps.as_array(), &[0, 0, 0, 0, 0]);
        assert_eq!(results.summaries[4].job_count, 0);
    }

    #[test]
    fn test_priority_missing_attribute_fails_whole_call() {
        let records = vec![
            priority_record("t-1", 1, 5),
            ExecutionRecord::new("t-2").with_attribute(ACTIVITIES_COMPLETED, "1"),
        ];
        let err = aggregate_priority(&records).unwrap_err();
        match err {
            RunError::Parse {
                job_id, attribute, ..
            } => {
                assert_eq!(job_id, "t-2");
                assert_eq!(attribute, PRIORITY);
            }
            other => panic!("Expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_progress_fails() {
        let records = vec![ExecutionRecord::new("t-1").with_attribute(PRIORITY, "2")];
        assert!(matches!(
            aggregate_priority(&records),
            Err(RunError::Parse { .. })
        ));
    }

    #[test]
    fn test_fairness_gold_and_silver() {
        let mut records: Vec<ExecutionRecord> = (1..=2)
            .map(|i| fairness_record(&format!("t-{i}"), "gold", 10, 5))
            .collect();
        records.extend((3..=10).map(|i| fairness_record(&format!("t-{i}"), "silver", 1, 2)));

        let results = aggregate_fairness(&records).unwrap();
        assert_eq!(results.total_jobs, 10);
        assert_eq!(
            results.summaries,
            vec![
                FairnessSummary {
                    key: "gold".to_string(),
                    weight: 10,
                    job_count: 2,
                    steps: StepCounts::from([2, 2, 2, 2, 2]),
                },
                FairnessSummary {
                    key: "silver".to_string(),
                    weight: 1,
                    job_count: 8,
                    steps: StepCounts::from([8, 8, 0, 0, 0]),
                },
            ]
        );
    }

    #[test]
    fn test_fairness_sorted_by_weight_then_first_seen() {
        let records = vec![
            fairness_record("t-1", "economy", 1, 0),
            fairness_record("t-2", "business", 5, 0),
            fairness_record("t-3", "partner", 5, 0),
            fairness_record("t-4", "first", 15, 0),
        ];
        let results = aggregate_fairness(&records).unwrap();
        let keys: Vec<&str> = results.summaries.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["first", "business", "partner", "economy"]);
    }

    #[test]
    fn test_fairness_same_key_different_weight_is_two_buckets() {
        let records = vec![
            fairness_record("t-1", "gold", 10, 1),
            fairness_record("t-2", "gold", 0, 1),
        ];
        let results = aggregate_fairness(&records).unwrap();
        assert_eq!(results.summaries.len(), 2);
        assert_eq!(results.summaries[0].weight, 10);
        assert_eq!(results.summaries[1].weight, 0);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let records = vec![
            fairness_record("t-1", "gold", 10, 3),
            fairness_record("t-2", "silver", 1, 4),
        ];
        let first = aggregate(&records, RunMode::Fairness).unwrap();
        let second = aggregate(&records, RunMode::Fairness).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_is_complete() {
        let done = aggregate(&[priority_record("t-1", 1, 5)], RunMode::Priority).unwrap();
        assert!(done.is_complete());

        let running = aggregate(
            &[priority_record("t-1", 1, 5), priority_record("t-2", 2, 4)],
            RunMode::Priority,
        )
        .unwrap();
        assert!(!running.is_complete());

        let empty = aggregate(&[], RunMode::Fairness).unwrap();
        assert!(!empty.is_complete());
    }

    #[test]
    fn test_priority_wire_format() {
        let results = aggregate_priority(&[priority_record("t-1", 2, 1)]).unwrap();
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["totalWorkflowsInTest"], 1);
        let second = &json["workflowsByPriority"][1];
        assert_eq!(second["workflowPriority"], 2);
        assert_eq!(second["numberOfWorkflows"], 1);
        assert_eq!(
            second["activities"][0],
            serde_json::json!({"activityNumber": 1, "numberCompleted": 1})
        );
        assert_eq!(second["activities"][4]["activityNumber"], 5);
        assert_eq!(second["activities"][4]["numberCompleted"], 0);
    }

    #[test]
    fn test_fairness_wire_format_via_run_results() {
        let results = aggregate(&[fairness_record("t-1", "gold", 10, 5)], RunMode::Fairness).unwrap();
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["totalWorkflowsInTest"], 1);
        let gold = &json["workflowsByFairness"][0];
        assert_eq!(gold["fairnessKey"], "gold");
        assert_eq!(gold["fairnessWeight"], 10);
        assert_eq!(gold["numberOfWorkflows"], 1);
        assert_eq!(gold["activities"].as_array().unwrap().len(), 5);
    }
}
