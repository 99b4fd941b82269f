//! Service configuration: engine connection, HTTP listener, default bands.
//!
//! Loaded from an optional `fairload.toml`, then overridden field by field
//! from CLI flags and their environment fallbacks. Every section and field
//! has a default, so an empty file (or no file at all) is a valid
//! configuration for a local development server.
//!
//! # Example TOML
//!
//! ```toml
//! [engine]
//! address = "http://localhost:7243"
//! namespace = "default"
//! task_queue = "default"
//! request_timeout_ms = 10000
//!
//! [server]
//! listen = "0.0.0.0:7080"
//!
//! [fairness]
//! default_bands = [
//!   { key = "first-class", weight = 15 },
//!   { key = "business-class", weight = 5 },
//!   { key = "economy-class", weight = 1 },
//! ]
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::http::{Credentials, HttpEngineConfig};
use crate::error::ConfigFileError;
use crate::model::Band;

/// File name looked up by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "fairload.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairloadConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub fairness: FairnessSettings,
}

/// Connection to the workflow service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// API key; mutually exclusive with `cert_path`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// PEM client certificate for mutual TLS.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// PEM private key matching `cert_path`.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

/// HTTP control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Fairness defaults applied at the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairnessSettings {
    /// Bands used when a fairness request names none.
    #[serde(default = "default_bands")]
    pub default_bands: Vec<Band>,
}

fn default_address() -> String {
    "http://localhost:7243".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_task_queue() -> String {
    "default".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_listen() -> String {
    "0.0.0.0:7080".to_string()
}

/// first-class 15, business-class 5, economy-class 1.
pub fn default_bands() -> Vec<Band> {
    vec![
        Band::new("first-class", 15),
        Band::new("business-class", 5),
        Band::new("economy-class", 1),
    ]
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            namespace: default_namespace(),
            task_queue: default_task_queue(),
            request_timeout_ms: default_request_timeout_ms(),
            api_key: None,
            cert_path: None,
            key_path: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for FairnessSettings {
    fn default() -> Self {
        Self {
            default_bands: default_bands(),
        }
    }
}

/// Engine values supplied on the command line or through the environment.
///
/// `None` leaves the file (or default) value in place.
#[derive(Debug, Clone, Default)]
pub struct EngineOverrides {
    pub address: Option<String>,
    pub namespace: Option<String>,
    pub task_queue: Option<String>,
    pub api_key: Option<String>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl FairloadConfig {
    /// Parse a TOML string into a validated [`FairloadConfig`].
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`FairloadConfig`] from a file path.
    ///
    /// Returns [`ConfigFileError::Io`] if the file cannot be read,
    /// [`ConfigFileError::Parse`] if the TOML is malformed, or
    /// [`ConfigFileError::Validation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Loads `path` if given, else a discovered `fairload.toml`, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigFileError> {
        match path {
            Some(path) => Self::load(path),
            None => match std::env::current_dir().ok().and_then(|cwd| discover_config(&cwd)) {
                Some(found) => {
                    tracing::debug!(path = %found.display(), "Using discovered config file");
                    Self::load(&found)
                }
                None => Ok(Self::default()),
            },
        }
    }

    /// Applies CLI/environment values over the loaded ones, then re-validates.
    pub fn apply_overrides(&mut self, overrides: EngineOverrides) -> Result<(), ConfigFileError> {
        let engine = &mut self.engine;
        if let Some(address) = overrides.address {
            engine.address = address;
        }
        if let Some(namespace) = overrides.namespace {
            engine.namespace = namespace;
        }
        if let Some(task_queue) = overrides.task_queue {
            engine.task_queue = task_queue;
        }
        if let Some(api_key) = overrides.api_key {
            engine.api_key = Some(api_key);
        }
        if let Some(cert_path) = overrides.cert_path {
            engine.cert_path = Some(cert_path);
        }
        if let Some(key_path) = overrides.key_path {
            engine.key_path = Some(key_path);
        }
        self.validate()
    }

    /// Validate that the config is semantically correct.
    ///
    /// Checks:
    /// - engine address, namespace, and task queue are not blank
    /// - the request timeout is positive
    /// - an API key and a client certificate are not both set
    /// - a client certificate and key are set together
    /// - the listen address parses as a socket address
    /// - there is at least one default band, and every default band has a key
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        let engine = &self.engine;
        for (name, value) in [
            ("engine.address", &engine.address),
            ("engine.namespace", &engine.namespace),
            ("engine.task_queue", &engine.task_queue),
        ] {
            if value.trim().is_empty() {
                return Err(validation(format!("{name} must not be empty")));
            }
        }

        if engine.request_timeout_ms == 0 {
            return Err(validation("engine.request_timeout_ms must be greater than 0"));
        }

        if engine.api_key.is_some() && engine.cert_path.is_some() {
            return Err(validation(
                "engine.api_key and engine.cert_path are mutually exclusive",
            ));
        }

        if engine.cert_path.is_some() != engine.key_path.is_some() {
            return Err(validation(
                "engine.cert_path and engine.key_path must be set together",
            ));
        }

        if self.server.listen.parse::<SocketAddr>().is_err() {
            return Err(validation(format!(
                "server.listen '{}' is not a valid socket address",
                self.server.listen
            )));
        }

        if self.fairness.default_bands.is_empty() {
            return Err(validation(
                "fairness.default_bands must contain at least one band",
            ));
        }
        if let Some(pos) = self
            .fairness
            .default_bands
            .iter()
            .position(|b| b.key.trim().is_empty())
        {
            return Err(validation(format!(
                "fairness.default_bands entry {} has an empty key",
                pos + 1
            )));
        }

        Ok(())
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigFileError> {
        self.server.listen.parse().map_err(|_| {
            validation(format!(
                "server.listen '{}' is not a valid socket address",
                self.server.listen
            ))
        })
    }
}

impl EngineSettings {
    /// Convert the `request_timeout_ms` field to a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Resolves credentials, reading PEM files from disk for mutual TLS.
    pub fn credentials(&self) -> Result<Credentials, ConfigFileError> {
        if let Some(key) = &self.api_key {
            return Ok(Credentials::ApiKey(key.clone()));
        }
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Ok(Credentials::Mtls {
                cert_pem: read_file(cert)?,
                key_pem: read_file(key)?,
            }),
            (None, None) => Ok(Credentials::None),
            _ => Err(validation(
                "engine.cert_path and engine.key_path must be set together",
            )),
        }
    }

    /// Settings for [`HttpEngine`](crate::engine::HttpEngine).
    pub fn http_engine_config(&self) -> Result<HttpEngineConfig, ConfigFileError> {
        Ok(HttpEngineConfig {
            address: self.address.clone(),
            namespace: self.namespace.clone(),
            request_timeout: self.request_timeout(),
            credentials: self.credentials()?,
        })
    }
}

/// Walks from `start` up through its parents looking for [`CONFIG_FILE_NAME`].
pub fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigFileError> {
    std::fs::read(path).map_err(|source| ConfigFileError::Io {
        source,
        path: path.display().to_string(),
    })
}

fn validation(message: impl Into<String>) -> ConfigFileError {
    ConfigFileError::Validation {
        message: message.into(),
    }
}
