//! Handler composition entries as expressed in TOML.
//!
//! Each event type maps to an ordered list of [`HandlerEntryConfig`]s. The
//! core crate's registry turns these into handler chains; this module only
//! describes and validates the shape.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, PRIORITY_MAX, PRIORITY_MIN};

/// A single handler entry for one event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerEntryConfig {
    /// Registered handler name (e.g. "block-tools").
    pub name: String,

    /// Disabled entries are dropped from the composed chain.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Priority override. Absent means the handler keeps its built-in default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Extra tags added to the handler's default tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Handler-specific options passed to the handler constructor.
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub options: toml::Table,
}

fn default_enabled() -> bool {
    true
}

impl HandlerEntryConfig {
    /// An enabled entry with no overrides.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            priority: None,
            tags: Vec::new(),
            options: toml::Table::new(),
        }
    }

    /// Set the priority override.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set a handler option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The options converted to JSON, the form handler constructors consume.
    pub fn options_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.options).unwrap_or(serde_json::Value::Null)
    }
}

/// Global tag filters applied to every composed handler.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TagFilterConfig {
    /// When non-empty, only handlers carrying at least one of these tags run.
    #[serde(default)]
    pub enable_tags: Vec<String>,

    /// Handlers carrying any of these tags are dropped.
    #[serde(default)]
    pub disable_tags: Vec<String>,
}

impl TagFilterConfig {
    /// Whether a handler with the given tags passes the filters.
    pub fn admits<'a, I>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        if tags
            .clone()
            .into_iter()
            .any(|t| self.disable_tags.iter().any(|d| d == t))
        {
            return false;
        }
        self.enable_tags.is_empty()
            || tags
                .into_iter()
                .any(|t| self.enable_tags.iter().any(|e| e == t))
    }
}

pub(crate) fn validate_entries(
    event: &str,
    entries: &[HandlerEntryConfig],
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (i, entry) in entries.iter().enumerate() {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "handlers.{event}[{i}].name must not be empty"
            )));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "handlers.{event}[{i}]: duplicate handler {:?}",
                entry.name
            )));
        }
        if let Some(priority) = entry.priority
            && !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority)
        {
            return Err(ConfigError::Validation(format!(
                "handlers.{event}[{i}].priority must be in [{PRIORITY_MIN}, {PRIORITY_MAX}], got {priority}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppConfig;

    #[test]
    fn test_absent_priority_stays_none() {
        let toml = r#"
            [[handlers.PreToolUse]]
            name = "block-tools"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.handlers["PreToolUse"][0].priority, None);
    }

    #[test]
    fn test_negative_priority_in_range() {
        let toml = r#"
            [[handlers.PreToolUse]]
            name = "early"
            priority = -20
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.handlers["PreToolUse"][0].priority, Some(-20));
    }

    #[test]
    fn test_rejects_out_of_range_priority() {
        let toml = r#"
            [[handlers.PreToolUse]]
            name = "block-tools"
            priority = 5000
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("priority"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let toml = r#"
            [[handlers.Stop]]
            name = "a"

            [[handlers.Stop]]
            name = "a"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_empty_name() {
        let toml = r#"
            [[handlers.Stop]]
            name = " "
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_options_convert_to_json() {
        let entry = HandlerEntryConfig::named("block-tools")
            .with_option("tools", vec!["Bash".to_string()])
            .with_option("reason", "no shell");
        let json = entry.options_json();
        assert_eq!(json["tools"][0], "Bash");
        assert_eq!(json["reason"], "no shell");
    }

    #[test]
    fn test_tag_filter_disable_wins() {
        let filter = TagFilterConfig {
            enable_tags: vec!["safety".to_string()],
            disable_tags: vec!["experimental".to_string()],
        };
        assert!(filter.admits(["safety"]));
        assert!(!filter.admits(["safety", "experimental"]));
        assert!(!filter.admits(["context"]));
    }

    #[test]
    fn test_tag_filter_empty_admits_everything() {
        let filter = TagFilterConfig::default();
        assert!(filter.admits([]));
        assert!(filter.admits(["anything"]));
    }
}
