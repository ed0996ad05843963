#![deny(unsafe_code)]

//! Configuration loading, validation, and environment overrides for hookgate.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure,
//! the [`handlers`] module describing per-event handler composition, and the
//! [`env`] module for environment-variable overrides.

/// Environment-variable overrides layered on top of the config file.
pub mod env;
/// Per-event handler composition entries and tag filters.
pub mod handlers;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use handlers::{HandlerEntryConfig, TagFilterConfig};

/// Lowest handler priority accepted from configuration.
pub const PRIORITY_MIN: i32 = -1000;
/// Highest handler priority accepted from configuration.
pub const PRIORITY_MAX: i32 = 1000;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon process and socket configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Input validation configuration.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Global tag filters applied while composing handler chains.
    #[serde(default)]
    pub tags: TagFilterConfig,

    /// Handler composition, keyed by event type name (e.g. `PreToolUse`).
    #[serde(default)]
    pub handlers: BTreeMap<String, Vec<HandlerEntryConfig>>,
}

/// Configuration for the daemon process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// PID file written at startup and removed on shutdown.
    #[serde(default = "default_pid_path")]
    pub pid_path: String,

    /// Shut down after this many seconds without a request (0 = never).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How often the idle monitor wakes up.
    #[serde(default = "default_idle_check_interval_secs")]
    pub idle_check_interval_secs: u64,

    /// Upper bound on reading a request line from a client.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests to finish.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            pid_path: default_pid_path(),
            idle_timeout_secs: default_idle_timeout_secs(),
            idle_check_interval_secs: default_idle_check_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_socket_path() -> String {
    "/tmp/hookgate.sock".to_string()
}

fn default_pid_path() -> String {
    "/tmp/hookgate.pid".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_idle_check_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_drain_timeout_secs() -> u64 {
    5
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Number of log entries retained in memory for `get_logs`.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_buffer_capacity() -> usize {
    1000
}

/// Input validation configuration.
///
/// Both axes can be overridden from the environment, see [`env`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Validate `hook_input` against the per-event schema validator.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reject invalid input instead of logging and dispatching anyway.
    #[serde(default)]
    pub strict: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.socket_path.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.socket_path must not be empty".to_string(),
            ));
        }
        if self.daemon.pid_path.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.pid_path must not be empty".to_string(),
            ));
        }
        if self.daemon.idle_check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "daemon.idle_check_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.daemon.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "daemon.request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.daemon.drain_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "daemon.drain_timeout_secs must be non-zero".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                VALID_LOG_LEVELS, self.logging.level
            )));
        }
        if self.logging.buffer_capacity == 0 {
            return Err(ConfigError::Validation(
                "logging.buffer_capacity must be at least 1".to_string(),
            ));
        }

        for (event, entries) in &self.handlers {
            handlers::validate_entries(event, entries)?;
        }

        Ok(())
    }

    /// Apply environment overrides from the real process environment.
    ///
    /// Returns warnings for variables that were set but could not be parsed.
    pub fn apply_process_env(&mut self) -> Vec<String> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using the given variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        env::EnvOverrides::from_lookup(lookup).apply(self)
    }
}
