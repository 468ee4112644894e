//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Well-known socket location shared with every client binding.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/allpath_runner.sock";

/// Deadline values (seconds) bounding each connection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Budget for a whole pipeline run.
    #[serde(default = "default_pipeline_seconds")]
    pub pipeline_seconds: u64,
    /// Budget for receiving a complete request after accept.
    #[serde(default = "default_request_read_seconds")]
    pub request_read_seconds: u64,
    /// Connection timeout callers are documented to apply.
    ///
    /// Only used for validation: the daemon's own deadlines must fire first.
    #[serde(default = "default_client_seconds")]
    pub client_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            pipeline_seconds: default_pipeline_seconds(),
            request_read_seconds: default_request_read_seconds(),
            client_seconds: default_client_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Pipeline deadline as a [`Duration`].
    #[must_use]
    pub fn pipeline(&self) -> Duration {
        Duration::from_secs(self.pipeline_seconds)
    }

    /// Request read deadline as a [`Duration`].
    #[must_use]
    pub fn request_read(&self) -> Duration {
        Duration::from_secs(self.request_read_seconds)
    }
}

fn default_pipeline_seconds() -> u64 {
    100
}

fn default_request_read_seconds() -> u64 {
    10
}

fn default_client_seconds() -> u64 {
    120
}

/// Per-provider endpoint overrides.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProviderOverride {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`).
    pub base_url: Option<String>,
    /// Model used when the request does not name one.
    pub model: Option<String>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_PATH)
}

fn default_max_concurrent_connections() -> usize {
    64
}

fn default_max_request_bytes() -> usize {
    1_048_576
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Filesystem path of the listening socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Maximum connections served at once; excess ones get a busy result.
    #[serde(default = "default_max_concurrent_connections")]
    pub max_concurrent_connections: usize,
    /// Largest request payload accepted.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Optional directory searched recursively for additional skill documents.
    #[serde(default)]
    pub skills_dir: Option<PathBuf>,
    /// Deadline configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Provider endpoint overrides keyed by provider identifier.
    #[serde(default)]
    pub providers: HashMap<String, ProviderOverride>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_concurrent_connections: default_max_concurrent_connections(),
            max_request_bytes: default_max_request_bytes(),
            skills_dir: None,
            timeouts: TimeoutConfig::default(),
            providers: HashMap::new(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_connections == 0 {
            return Err(AppError::Config(
                "max_concurrent_connections must be greater than zero".into(),
            ));
        }

        if self.max_concurrent_connections > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(AppError::Config(format!(
                "max_concurrent_connections must not exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }

        if self.max_request_bytes == 0 {
            return Err(AppError::Config(
                "max_request_bytes must be greater than zero".into(),
            ));
        }

        if self.timeouts.pipeline_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.pipeline_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.request_read_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.request_read_seconds must be greater than zero".into(),
            ));
        }

        // Read and pipeline budgets run back to back inside one client timeout.
        let daemon_budget = self
            .timeouts
            .pipeline_seconds
            .saturating_add(self.timeouts.request_read_seconds);
        if daemon_budget >= self.timeouts.client_seconds {
            return Err(AppError::Config(format!(
                "timeouts.pipeline_seconds + timeouts.request_read_seconds ({daemon_budget}) \
                 must be below timeouts.client_seconds ({})",
                self.timeouts.client_seconds
            )));
        }

        if self.socket_path.as_os_str().is_empty() {
            return Err(AppError::Config("socket_path must not be empty".into()));
        }

        Ok(())
    }

    /// Endpoint override for `provider`, if configured.
    #[must_use]
    pub fn provider_override(&self, provider: &str) -> Option<&ProviderOverride> {
        self.providers.get(provider)
    }
}
