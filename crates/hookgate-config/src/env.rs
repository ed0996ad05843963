//! Environment-variable overrides.
//!
//! A small documented subset of settings can be overridden from the
//! environment, taking precedence over the config file:
//!
//! | variable | setting |
//! |---|---|
//! | `HOOKGATE_LOG_LEVEL` | `logging.level` |
//! | `HOOKGATE_VALIDATION_ENABLED` | `validation.enabled` |
//! | `HOOKGATE_VALIDATION_STRICT` | `validation.strict` |
//!
//! Booleans accept `1/true/yes/on` and `0/false/no/off`, case-insensitive.

use tracing::debug;

use crate::{AppConfig, VALID_LOG_LEVELS};

pub const LOG_LEVEL_VAR: &str = "HOOKGATE_LOG_LEVEL";
pub const VALIDATION_ENABLED_VAR: &str = "HOOKGATE_VALIDATION_ENABLED";
pub const VALIDATION_STRICT_VAR: &str = "HOOKGATE_VALIDATION_STRICT";

/// Raw override values captured from the environment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvOverrides {
    pub log_level: Option<String>,
    pub validation_enabled: Option<String>,
    pub validation_strict: Option<String>,
}

impl EnvOverrides {
    /// Capture overrides through the given lookup (usually `std::env::var`).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            log_level: lookup(LOG_LEVEL_VAR),
            validation_enabled: lookup(VALIDATION_ENABLED_VAR),
            validation_strict: lookup(VALIDATION_STRICT_VAR),
        }
    }

    /// Apply the overrides to `config`, returning a warning for each value
    /// that was present but unusable. Unusable values leave the config as is.
    pub fn apply(&self, config: &mut AppConfig) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(raw) = &self.log_level {
            let level = raw.trim().to_ascii_lowercase();
            if VALID_LOG_LEVELS.contains(&level.as_str()) {
                debug!(var = LOG_LEVEL_VAR, %level, "log level overridden from environment");
                config.logging.level = level;
            } else {
                warnings.push(format!("ignoring {LOG_LEVEL_VAR}={raw:?}: unknown level"));
            }
        }

        apply_bool(
            VALIDATION_ENABLED_VAR,
            self.validation_enabled.as_deref(),
            &mut config.validation.enabled,
            &mut warnings,
        );
        apply_bool(
            VALIDATION_STRICT_VAR,
            self.validation_strict.as_deref(),
            &mut config.validation.strict,
            &mut warnings,
        );

        warnings
    }
}

fn apply_bool(var: &str, raw: Option<&str>, target: &mut bool, warnings: &mut Vec<String>) {
    let Some(raw) = raw else {
        return;
    };
    match parse_bool(raw) {
        Some(value) => {
            debug!(var, value, "setting overridden from environment");
            *target = value;
        }
        None => warnings.push(format!("ignoring {var}={raw:?}: expected a boolean")),
    }
}

/// Parse a boolean environment value.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
