//! Error types for run configuration, submission, and result aggregation.
//!
//! [`RunError`] is the taxonomy surfaced by the core (allocator, launcher,
//! aggregator). [`EngineError`] classifies failures talking to the external
//! execution engine, and [`ConfigFileError`] covers loading the service
//! configuration file.

/// Errors produced while preparing, launching, or summarizing a run.
#[derive(Debug, thiserror::Error, Clone)]
pub enum RunError {
    /// Malformed or contradictory run request. Raised before any submission.
    #[error("Invalid run configuration: {message}")]
    Config { message: String },

    /// A single job's submission was refused or failed in transit.
    ///
    /// Recorded per job in a [`LaunchReport`](crate::launcher::LaunchReport);
    /// never aborts the remaining submissions.
    #[error("Failed to submit job '{job_id}': {source}")]
    Submission {
        job_id: String,
        #[source]
        source: EngineError,
    },

    /// An execution record is missing an attribute or holds an invalid value.
    ///
    /// Fatal for the whole aggregation call.
    #[error("Invalid attribute '{attribute}' on job '{job_id}': {message}")]
    Parse {
        job_id: String,
        attribute: String,
        message: String,
    },

    /// The engine's query call failed.
    #[error("Engine query failed: {source}")]
    Query {
        #[source]
        source: EngineError,
    },
}

impl RunError {
    /// Shorthand for a [`RunError::Config`] with the given message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns the error kind as a static string for logging and responses.
    ///
    /// Kinds: `"config"`, `"submission"`, `"parse"`, `"query"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Submission { .. } => "submission",
            Self::Parse { .. } => "parse",
            Self::Query { .. } => "query",
        }
    }
}

/// Failures reported by, or while talking to, the external execution engine.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The engine refused the request, e.g. a job id that already exists.
    #[error("Rejected by engine: {message}")]
    Rejected { message: String },

    /// The engine's response could not be decoded.
    #[error("Malformed engine response: {message}")]
    Decode { message: String },
}

impl EngineError {
    /// Returns the error category as a static string.
    ///
    /// Categories: `"http"`, `"timeout"`, `"connection"`, `"rejected"`, `"decode"`.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Rejected { .. } => "rejected",
            Self::Decode { .. } => "decode",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`EngineError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

/// Errors loading or validating the service configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// The file is not valid TOML or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    /// The file parsed but holds contradictory or empty values.
    #[error("Config validation error: {message}")]
    Validation { message: String },

    /// The file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        source: std::io::Error,
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_kinds() {
        assert_eq!(RunError::config("x").kind(), "config");
        assert_eq!(
            RunError::Submission {
                job_id: "t-1".to_string(),
                source: EngineError::Timeout,
            }
            .kind(),
            "submission"
        );
        assert_eq!(
            RunError::Parse {
                job_id: "t-1".to_string(),
                attribute: "Priority".to_string(),
                message: "missing".to_string(),
            }
            .kind(),
            "parse"
        );
        assert_eq!(
            RunError::Query {
                source: EngineError::Timeout
            }
            .kind(),
            "query"
        );
    }

    #[test]
    fn test_submission_error_message_names_job() {
        let err = RunError::Submission {
            job_id: "run-7".to_string(),
            source: EngineError::Rejected {
                message: "workflow already started".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("run-7"));
        assert!(msg.contains("workflow already started"));
    }

    #[test]
    fn test_engine_error_categories() {
        assert_eq!(
            EngineError::Http {
                status: 503,
                body: String::new()
            }
            .category(),
            "http"
        );
        assert_eq!(EngineError::Timeout.category(), "timeout");
        assert_eq!(
            EngineError::Connection {
                message: "refused".to_string()
            }
            .category(),
            "connection"
        );
        assert_eq!(
            EngineError::Rejected {
                message: "dup".to_string()
            }
            .category(),
            "rejected"
        );
        assert_eq!(
            EngineError::Decode {
                message: "eof".to_string()
            }
            .category(),
            "decode"
        );
    }
}
