//! Search-attribute codec between [`Classification`] and engine attributes.
//!
//! Jobs carry their classification and progress as indexed key/value
//! attributes on the engine side. Values are stored as JSON scalars, so a
//! keyword comes back as a JSON string (`"gold"`) and an integer bare (`3`).
//! Keywords are JSON-decoded so a key round-trips byte for byte; integers
//! tolerate surrounding quotes. A missing or malformed attribute is always a
//! [`RunError::Parse`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::model::{Classification, ExecutionRecord, PRIORITY_LEVELS, STEP_COUNT};

/// Priority class of a priority-mode job (Int).
pub const PRIORITY: &str = "Priority";
/// Fairness band key of a fairness-mode job (Keyword).
pub const FAIRNESS_KEY: &str = "FairnessKey";
/// Effective fairness weight of a fairness-mode job (Int).
pub const FAIRNESS_WEIGHT: &str = "FairnessWeight";
/// Number of steps the job has completed so far (Int).
pub const ACTIVITIES_COMPLETED: &str = "ActivitiesCompleted";

/// A typed attribute value as registered with the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttributeValue {
    Int(i64),
    Keyword(String),
}

impl AttributeValue {
    /// Engine type name (`"Int"` or `"Keyword"`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "Int",
            Self::Keyword(_) => "Keyword",
        }
    }

    /// JSON encoding of the value, as the engine stores and returns it.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Keyword(v) => serde_json::Value::from(v.as_str()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Attributes attached to a job at submission time.
///
/// Always includes [`ACTIVITIES_COMPLETED`] set to 0.
pub fn initial_attributes(classification: &Classification) -> Vec<(&'static str, AttributeValue)> {
    let mut attrs = match classification {
        Classification::Priority(priority) => {
            vec![(PRIORITY, AttributeValue::Int(i64::from(*priority)))]
        }
        Classification::Fairness { key, weight } => vec![
            (FAIRNESS_KEY, AttributeValue::Keyword(key.clone())),
            (FAIRNESS_WEIGHT, AttributeValue::Int(i64::from(*weight))),
        ],
    };
    attrs.push((ACTIVITIES_COMPLETED, AttributeValue::Int(0)));
    attrs
}

/// Parses the priority attribute (1..=5).
pub fn parse_priority(record: &ExecutionRecord) -> Result<u8, RunError> {
    let raw = required(record, PRIORITY)?;
    let priority = parse_int::<u8>(record, PRIORITY, raw)?;
    if priority == 0 || priority > PRIORITY_LEVELS {
        return Err(parse_error(
            record,
            PRIORITY,
            format!("priority {priority} outside 1..={PRIORITY_LEVELS}"),
        ));
    }
    Ok(priority)
}

/// Parses the fairness key and effective weight.
pub fn parse_fairness(record: &ExecutionRecord) -> Result<(String, u32), RunError> {
    let key = decode_keyword(required(record, FAIRNESS_KEY)?);
    let raw_weight = required(record, FAIRNESS_WEIGHT)?;
    let weight = parse_int::<u32>(record, FAIRNESS_WEIGHT, raw_weight)?;
    Ok((key, weight))
}

/// Parses the completed-steps counter (0..=5).
pub fn parse_progress(record: &ExecutionRecord) -> Result<usize, RunError> {
    let raw = required(record, ACTIVITIES_COMPLETED)?;
    let completed = parse_int::<usize>(record, ACTIVITIES_COMPLETED, raw)?;
    if completed > STEP_COUNT {
        return Err(parse_error(
            record,
            ACTIVITIES_COMPLETED,
            format!("counter {completed} outside 0..={STEP_COUNT}"),
        ));
    }
    Ok(completed)
}

fn required<'a>(record: &'a ExecutionRecord, name: &str) -> Result<&'a str, RunError> {
    record
        .attribute(name)
        .ok_or_else(|| parse_error(record, name, "attribute missing".to_string()))
}

fn parse_int<T>(record: &ExecutionRecord, name: &str, raw: &str) -> Result<T, RunError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    let value = unquote(raw);
    value
        .parse::<T>()
        .map_err(|e| parse_error(record, name, format!("'{value}' is not a valid value: {e}")))
}

/// A keyword stored as a JSON string is decoded; anything else is taken verbatim.
fn decode_keyword(raw: &str) -> String {
    serde_json::from_str::<String>(raw.trim()).unwrap_or_else(|_| raw.to_string())
}

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches('"')
}

fn parse_error(record: &ExecutionRecord, attribute: &str, message: String) -> RunError {
    RunError::Parse {
        job_id: record.id.clone(),
        attribute: attribute.to_string(),
        message,
    }
}
