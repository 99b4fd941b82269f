//! `fairload` CLI subcommands.
//!
//! Provides `serve` (HTTP control surface), `launch` (submit one run), and
//! `status` (aggregate a run, optionally polling until it finishes).

pub mod launch;
pub mod serve;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use fairload::config::{EngineOverrides, FairloadConfig};
use fairload::engine::{ExecutionEngine, HttpEngine, MemoryEngine};

/// Which execution engine commands talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Workflow service over HTTP
    Http,
    /// In-process simulation (state lives only as long as the process)
    Memory,
}

/// Flags shared by every subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path to config file (default: auto-discover fairload.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Execution engine to use
    #[arg(long, global = true, value_enum, default_value_t = EngineKind::Http)]
    pub engine: EngineKind,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(flatten)]
    pub engine_args: EngineArgs,
}

/// Engine connection flags; each falls back to an environment variable.
#[derive(Debug, Args)]
pub struct EngineArgs {
    /// Workflow service address (overrides config)
    #[arg(long, global = true, env = "TEMPORAL_ADDRESS")]
    pub address: Option<String>,

    /// Namespace (overrides config)
    #[arg(long, global = true, env = "TEMPORAL_NAMESPACE")]
    pub namespace: Option<String>,

    /// Task queue jobs are started on (overrides config)
    #[arg(long, global = true, env = "TEMPORAL_TASK_QUEUE")]
    pub task_queue: Option<String>,

    /// API key (mutually exclusive with --cert-path)
    #[arg(long, global = true, env = "TEMPORAL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// PEM client certificate for mutual TLS
    #[arg(long, global = true, env = "TEMPORAL_CERT_PATH")]
    pub cert_path: Option<PathBuf>,

    /// PEM private key for mutual TLS
    #[arg(long, global = true, env = "TEMPORAL_KEY_PATH")]
    pub key_path: Option<PathBuf>,
}

impl EngineArgs {
    /// Engine values to layer over the config file. Blank values are ignored.
    pub fn overrides(&self) -> EngineOverrides {
        fn non_blank(value: &Option<String>) -> Option<String> {
            value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
        }

        EngineOverrides {
            address: non_blank(&self.address),
            namespace: non_blank(&self.namespace),
            task_queue: non_blank(&self.task_queue),
            api_key: non_blank(&self.api_key),
            cert_path: self.cert_path.clone().filter(|p| !p.as_os_str().is_empty()),
            key_path: self.key_path.clone().filter(|p| !p.as_os_str().is_empty()),
        }
    }
}

/// Loads the config file (explicit, discovered, or defaults) and applies
/// flag/environment overrides.
pub fn load_config(global: &GlobalArgs) -> Result<FairloadConfig> {
    let mut config = FairloadConfig::resolve(global.config.as_deref()).with_context(|| {
        match &global.config {
            Some(path) => format!("Failed to load config '{}'", path.display()),
            None => "Failed to load discovered fairload.toml".to_string(),
        }
    })?;
    config
        .apply_overrides(global.engine_args.overrides())
        .context("Invalid engine settings")?;
    Ok(config)
}

/// Builds the engine handle selected by `--engine`.
pub fn build_engine(kind: EngineKind, config: &FairloadConfig) -> Result<Arc<dyn ExecutionEngine>> {
    match kind {
        EngineKind::Http => {
            let http_config = config
                .engine
                .http_engine_config()
                .context("Failed to read engine credentials")?;
            let engine = HttpEngine::new(http_config).context("Failed to create HTTP engine")?;
            tracing::debug!(
                base_url = engine.base_url(),
                namespace = %config.engine.namespace,
                "Using HTTP engine"
            );
            Ok(Arc::new(engine))
        }
        EngineKind::Memory => {
            tracing::debug!("Using in-memory simulation engine");
            Ok(Arc::new(MemoryEngine::simulated()))
        }
    }
}
