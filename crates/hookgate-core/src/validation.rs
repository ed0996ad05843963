//! Per-event input validation gate.
//!
//! The gate has two axes: enabled/disabled and strict/lenient. Validators are
//! built lazily, once per event type, by a [`ValidatorFactory`] and cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hookgate_config::ValidationConfig;
use serde_json::Value;
use tracing::warn;

use crate::event::EventType;

/// Checks a `hook_input` payload, returning every problem found.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, payload: &Value) -> Vec<String>;
}

/// Builds the validator for one event type.
pub trait ValidatorFactory: Send + Sync {
    fn build(&self, event: EventType) -> Arc<dyn SchemaValidator>;
}

/// Kinds of value a required field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Object,
    Any,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => !value.is_null(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Object => "an object",
            FieldKind::Any => "present",
        }
    }
}

/// Validator that checks a fixed set of required top-level fields.
///
/// If the payload carries `hook_event_name` it must name the event being
/// dispatched.
#[derive(Debug, Clone)]
pub struct RequiredFields {
    event: EventType,
    fields: Vec<(&'static str, FieldKind)>,
}

impl RequiredFields {
    /// No required fields beyond the event-name check.
    pub fn new(event: EventType) -> Self {
        Self {
            event,
            fields: Vec::new(),
        }
    }

    /// Require `field` to be present with the given kind.
    pub fn require(mut self, field: &'static str, kind: FieldKind) -> Self {
        self.fields.push((field, kind));
        self
    }

    /// The built-in field requirements for an event type.
    pub fn for_event(event: EventType) -> Self {
        let base = Self::new(event);
        match event {
            EventType::PreToolUse | EventType::PermissionRequest => base
                .require("tool_name", FieldKind::String)
                .require("tool_input", FieldKind::Object),
            EventType::PostToolUse => base
                .require("tool_name", FieldKind::String)
                .require("tool_input", FieldKind::Object)
                .require("tool_response", FieldKind::Any),
            EventType::UserPromptSubmit => base.require("prompt", FieldKind::String),
            EventType::Notification => base.require("message", FieldKind::String),
            EventType::SessionStart | EventType::SessionEnd => {
                base.require("session_id", FieldKind::String)
            }
            EventType::PreCompact => base.require("trigger", FieldKind::String),
            EventType::Stop | EventType::SubagentStop => base,
        }
    }
}

impl SchemaValidator for RequiredFields {
    fn validate(&self, payload: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        for (field, kind) in &self.fields {
            match payload.get(*field) {
                None | Some(Value::Null) => {
                    problems.push(format!("missing required field '{field}'"))
                }
                Some(value) if !kind.accepts(value) => {
                    problems.push(format!("field '{field}' must be {}", kind.describe()))
                }
                Some(_) => {}
            }
        }
        if let Some(name) = payload.get("hook_event_name") {
            match name.as_str() {
                Some(name) if name == self.event.as_str() => {}
                Some(name) => problems.push(format!(
                    "hook_event_name '{name}' does not match event '{}'",
                    self.event
                )),
                None => problems.push("field 'hook_event_name' must be a string".to_string()),
            }
        }
        problems
    }
}

/// Factory producing [`RequiredFields::for_event`] validators.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValidators;

impl ValidatorFactory for DefaultValidators {
    fn build(&self, event: EventType) -> Arc<dyn SchemaValidator> {
        Arc::new(RequiredFields::for_event(event))
    }
}

/// Result of passing a payload through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Validation is disabled.
    Skipped,
    Valid,
    /// Strict mode: do not dispatch.
    Rejected(Vec<String>),
    /// Lenient mode: problems were logged, dispatch anyway.
    Lenient(Vec<String>),
}

/// Validation gate in front of the router.
pub struct ValidationGate {
    enabled: bool,
    strict: bool,
    factory: Box<dyn ValidatorFactory>,
    cache: Mutex<HashMap<EventType, Arc<dyn SchemaValidator>>>,
}

impl ValidationGate {
    /// A gate using the default required-field validators.
    pub fn new(enabled: bool, strict: bool) -> Self {
        Self::with_factory(enabled, strict, DefaultValidators)
    }

    /// A gate configured from `[validation]`.
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.enabled, config.strict)
    }

    /// A gate using custom validators.
    pub fn with_factory(
        enabled: bool,
        strict: bool,
        factory: impl ValidatorFactory + 'static,
    ) -> Self {
        Self {
            enabled,
            strict,
            factory: Box::new(factory),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A gate that never validates.
    pub fn disabled() -> Self {
        Self::new(false, false)
    }

    /// Whether payloads are validated at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether validation failures reject the request.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Validate `payload` for `event`.
    pub fn check(&self, event: EventType, payload: &Value) -> GateOutcome {
        if !self.enabled {
            return GateOutcome::Skipped;
        }
        let problems = self.validator(event).validate(payload);
        if problems.is_empty() {
            GateOutcome::Valid
        } else if self.strict {
            GateOutcome::Rejected(problems)
        } else {
            warn!(
                event = %event,
                problems = ?problems,
                "input validation failed, dispatching anyway"
            );
            GateOutcome::Lenient(problems)
        }
    }

    fn validator(&self, event: EventType) -> Arc<dyn SchemaValidator> {
        match self.cache.lock() {
            Ok(mut cache) => Arc::clone(
                cache
                    .entry(event)
                    .or_insert_with(|| self.factory.build(event)),
            ),
            Err(_) => self.factory.build(event),
        }
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ValidationGate {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

impl std::fmt::Debug for ValidationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationGate")
            .field("enabled", &self.enabled)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_pre_tool_use_requirements() {
        let validator = RequiredFields::for_event(EventType::PreToolUse);
        assert!(
            validator
                .validate(&json!({"tool_name": "Bash", "tool_input": {"command": "ls"}}))
                .is_empty()
        );

        let problems = validator.validate(&json!({"tool_name": 7}));
        assert_eq!(
            problems,
            vec![
                "field 'tool_name' must be a string".to_string(),
                "missing required field 'tool_input'".to_string(),
            ]
        );
    }

    #[test]
    fn test_hook_event_name_must_match() {
        let validator = RequiredFields::for_event(EventType::Stop);
        assert!(validator.validate(&json!({"hook_event_name": "Stop"})).is_empty());
        let problems = validator.validate(&json!({"hook_event_name": "PreToolUse"}));
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("does not match"));
    }

    #[test]
    fn test_disabled_gate_skips() {
        let gate = ValidationGate::disabled();
        assert_eq!(gate.check(EventType::PreToolUse, &json!({})), GateOutcome::Skipped);
    }

    #[test]
    fn test_strict_rejects_and_lenient_passes() {
        let payload = json!({"tool_name": "Bash"});
        let strict = ValidationGate::new(true, true);
        assert!(matches!(
            strict.check(EventType::PreToolUse, &payload),
            GateOutcome::Rejected(_)
        ));

        let lenient = ValidationGate::new(true, false);
        assert!(matches!(
            lenient.check(EventType::PreToolUse, &payload),
            GateOutcome::Lenient(_)
        ));
    }

    struct Counting(Arc<AtomicUsize>);

    impl ValidatorFactory for Counting {
        fn build(&self, event: EventType) -> Arc<dyn SchemaValidator> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Arc::new(RequiredFields::for_event(event))
        }
    }

    #[test]
    fn test_validators_are_built_once_per_event() {
        let built = Arc::new(AtomicUsize::new(0));
        let gate = ValidationGate::with_factory(true, false, Counting(Arc::clone(&built)));
        for _ in 0..3 {
            gate.check(EventType::Stop, &json!({}));
            gate.check(EventType::Notification, &json!({"message": "hi"}));
        }
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(gate.cached(), 2);
    }
}
