//! Priority and fairness load-test driver for durable workflow engines.
//!
//! A run enumerates a batch of jobs, classifies each one by priority (1..=5)
//! or by a weighted fairness band, and submits them to an execution engine
//! with a start delay that smooths admission. Later, the engine's execution
//! records are aggregated back into per-class histograms of how many jobs
//! reached each of their five steps.
//!
//! # Modules
//!
//! - [`allocator`] assigns bands (round-robin or shuffled exact counts) and priorities
//! - [`schedule`] computes the submission window
//! - [`launcher`] submits a run and reports per-job outcomes
//! - [`aggregate`] turns execution records into per-class summaries
//! - [`engine`] is the engine seam, with HTTP and in-memory implementations
//! - [`server`] exposes the HTTP control surface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fairload::engine::{ExecutionEngine, ListFilter, MemoryEngine};
//! use fairload::launcher::Launcher;
//! use fairload::model::{Band, RunMode, RunRequest};
//!
//! # async fn example() -> Result<(), fairload::error::RunError> {
//! let engine = Arc::new(MemoryEngine::simulated());
//! let launcher = Launcher::new(engine.clone(), "default");
//!
//! let request = RunRequest::fairness(
//!     "demo",
//!     0,
//!     vec![Band::new("gold", 10).with_count(2), Band::new("silver", 1).with_count(8)],
//! );
//! let report = launcher.launch(&request).await?;
//! assert_eq!(report.submitted(), 10);
//!
//! let records = engine
//!     .query(&ListFilter::IdPrefix("demo-".to_string()))
//!     .await
//!     .map_err(|source| fairload::error::RunError::Query { source })?;
//! let results = fairload::aggregate::aggregate(&records, RunMode::Fairness)?;
//! println!("{}", serde_json::to_string_pretty(&results).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod allocator;
pub mod attributes;
pub mod config;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod model;
pub mod schedule;
pub mod server;
pub mod summary;

pub use error::{ConfigFileError, EngineError, RunError};
