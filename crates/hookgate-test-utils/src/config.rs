//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use hookgate_config::{AppConfig, HandlerEntryConfig};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .handler(
///         "PreToolUse",
///         HandlerEntryConfig::named("block-tools").with_option("tools", vec!["Bash"]),
///     )
///     .strict_validation()
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Put the socket and PID file inside `dir`.
    pub fn paths_in(mut self, dir: &Path) -> Self {
        self.config.daemon.socket_path = dir.join("hookgate.sock").display().to_string();
        self.config.daemon.pid_path = dir.join("hookgate.pid").display().to_string();
        self
    }

    /// Set the daemon idle timeout.
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.daemon.idle_timeout_secs = secs;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    /// Set both validation axes.
    pub fn validation(mut self, enabled: bool, strict: bool) -> Self {
        self.config.validation.enabled = enabled;
        self.config.validation.strict = strict;
        self
    }

    /// Enable strict validation.
    pub fn strict_validation(self) -> Self {
        self.validation(true, true)
    }

    /// Append a handler entry for `event`.
    pub fn handler(mut self, event: &str, entry: HandlerEntryConfig) -> Self {
        self.config
            .handlers
            .entry(event.to_string())
            .or_default()
            .push(entry);
        self
    }

    /// Only admit handlers carrying `tag` (repeatable).
    pub fn enable_tag(mut self, tag: &str) -> Self {
        self.config.tags.enable_tags.push(tag.to_string());
        self
    }

    /// Drop handlers carrying `tag`.
    pub fn disable_tag(mut self, tag: &str) -> Self {
        self.config.tags.disable_tags.push(tag.to_string());
        self
    }

    /// Finish building.
    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
