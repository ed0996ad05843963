//! Composing chains from TOML configuration with the built-in handlers.

use hookgate_config::{AppConfig, HandlerEntryConfig};
use hookgate_core::registry::CompositionError;
use hookgate_core::{Decision, EventType, HandlerRegistry};
use hookgate_test_utils::config::TestConfigBuilder;
use pretty_assertions::assert_eq;
use serde_json::json;

const CONFIG: &str = r#"
[[handlers.PreToolUse]]
name = "block-tools"
[handlers.PreToolUse.options]
tools = ["Bash", "WebFetch"]
reason = "network and shell are off limits"
guidance = "ask a human"

[[handlers.PreToolUse]]
name = "context-lines"
tags = ["team"]
[handlers.PreToolUse.options]
lines = ["working tree is a sandbox"]

[[handlers.SessionStart]]
name = "context-lines"
priority = -5
[handlers.SessionStart.options]
lines = ["welcome back"]
"#;

#[test]
fn test_toml_composes_working_chains() {
    let config = AppConfig::parse(CONFIG).unwrap();
    let router = HandlerRegistry::with_builtins().compose(&config).unwrap();

    let denied = router.route(
        EventType::PreToolUse,
        &json!({"tool_name": "Bash", "tool_input": {"command": "ls"}}),
    );
    assert_eq!(denied.decision(), Decision::Deny);
    assert_eq!(denied.terminated_by.as_deref(), Some("block-tools"));
    assert_eq!(
        denied.result.reason.as_deref(),
        Some("network and shell are off limits")
    );
    assert_eq!(denied.result.guidance.as_deref(), Some("ask a human"));
    // block-tools (10) runs before context-lines (90) and stops the chain.
    assert!(denied.result.context.is_empty());

    let allowed = router.route(EventType::PreToolUse, &json!({"tool_name": "Read"}));
    assert_eq!(allowed.decision(), Decision::Allow);
    assert_eq!(allowed.result.context, vec!["working tree is a sandbox"]);
    assert_eq!(allowed.handlers_matched, vec!["context-lines"]);

    let session = router.route(EventType::SessionStart, &json!({"session_id": "s1"}));
    assert_eq!(session.result.context, vec!["welcome back"]);
}

#[test]
fn test_absent_priority_keeps_builtin_default() {
    let config = AppConfig::parse(CONFIG).unwrap();
    let router = HandlerRegistry::with_builtins().compose(&config).unwrap();
    let described = router.describe();

    let pre: Vec<_> = described["PreToolUse"]
        .iter()
        .map(|h| (h.name.as_str(), h.priority))
        .collect();
    assert_eq!(pre, vec![("block-tools", 10), ("context-lines", 90)]);
    assert_eq!(described["SessionStart"][0].priority, -5);
    assert_eq!(
        described["PreToolUse"][1].tags,
        vec!["context".to_string(), "team".to_string()]
    );
}

#[test]
fn test_tag_filters_apply_to_builtin_tags() {
    let config = TestConfigBuilder::new()
        .handler(
            "PreToolUse",
            HandlerEntryConfig::named("block-tools").with_option("tools", vec!["Bash".to_string()]),
        )
        .handler(
            "PreToolUse",
            HandlerEntryConfig::named("context-lines")
                .with_option("lines", vec!["hello".to_string()]),
        )
        .enable_tag("safety")
        .build();
    let router = HandlerRegistry::with_builtins().compose(&config).unwrap();
    let names: Vec<_> = router.describe()["PreToolUse"]
        .iter()
        .map(|h| h.name.clone())
        .collect();
    assert_eq!(names, vec!["block-tools"]);

    let config = TestConfigBuilder::new()
        .handler(
            "PreToolUse",
            HandlerEntryConfig::named("block-tools").with_option("tools", vec!["Bash".to_string()]),
        )
        .disable_tag("safety")
        .build();
    let router = HandlerRegistry::with_builtins().compose(&config).unwrap();
    assert_eq!(router.handler_count(), 0);
}

#[test]
fn test_disabled_entries_are_not_composed() {
    let config = TestConfigBuilder::new()
        .handler(
            "Stop",
            HandlerEntryConfig::named("context-lines")
                .with_enabled(false)
                .with_option("lines", vec!["never".to_string()]),
        )
        .build();
    let router = HandlerRegistry::with_builtins().compose(&config).unwrap();
    let execution = router.route(EventType::Stop, &json!({}));
    assert!(execution.handlers_executed.is_empty());
}

#[test]
fn test_bad_builtin_options_fail_composition() {
    let config = TestConfigBuilder::new()
        .handler("PreToolUse", HandlerEntryConfig::named("block-tools"))
        .build();
    let err = HandlerRegistry::with_builtins()
        .compose(&config)
        .unwrap_err();
    assert!(matches!(err, CompositionError::Construct { .. }));
    assert!(err.to_string().contains("block-tools"));
}

#[test]
fn test_environment_overrides_take_precedence() {
    let mut config = TestConfigBuilder::new()
        .log_level("info")
        .validation(true, false)
        .build();
    let warnings = config.apply_env_overrides(|key| match key {
        "HOOKGATE_LOG_LEVEL" => Some("debug".to_string()),
        "HOOKGATE_VALIDATION_STRICT" => Some("yes".to_string()),
        "HOOKGATE_VALIDATION_ENABLED" => Some("maybe".to_string()),
        _ => None,
    });
    assert_eq!(config.logging.level, "debug");
    assert!(config.validation.strict);
    assert!(config.validation.enabled);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("HOOKGATE_VALIDATION_ENABLED"));
}
