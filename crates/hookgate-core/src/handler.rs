//! Handler contract: the trait every policy unit implements, plus the
//! metadata (name, priority, terminal flag, tags) the chain orders it by.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::decision::HookResult;

/// Priority given to handlers that do not specify one.
pub const DEFAULT_PRIORITY: i32 = 50;

/// A single policy unit evaluated against an incoming event payload.
///
/// `matches` must be a pure predicate: it may be called for handlers that
/// never run. `handle` may have side effects but must return promptly; the
/// engine does not preempt it. A handler that shells out is expected to
/// enforce its own timeout and turn it into a `HookResult` or an error.
pub trait Handler: Send + Sync {
    /// Whether this handler applies to the payload.
    fn matches(&self, payload: &Value) -> bool;

    /// Evaluate the payload.
    fn handle(&self, payload: &Value) -> Result<HookResult, HandlerError>;
}

/// Errors raised by handlers. They never escape the chain.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid options for handler '{handler}': {message}")]
    InvalidOptions { handler: String, message: String },

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// A [`HandlerError::Failed`] with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Ordering and behaviour metadata for a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerMeta {
    pub name: String,
    /// Lower runs first. Negative values are legal.
    pub priority: i32,
    /// A matching terminal handler decides the chain's outcome.
    pub terminal: bool,
    pub tags: BTreeSet<String>,
}

impl HandlerMeta {
    /// Metadata with the default priority, terminal, and no tags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: DEFAULT_PRIORITY,
            terminal: true,
            tags: BTreeSet::new(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set whether a match ends the chain.
    pub fn with_terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Whether the handler carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Total order key: `(priority, name)`.
    pub fn sort_key(&self) -> (i32, &str) {
        (self.priority, self.name.as_str())
    }
}

/// A handler paired with its metadata and an enabled flag.
#[derive(Clone)]
pub struct HandlerEntry {
    pub meta: HandlerMeta,
    pub enabled: bool,
    handler: Arc<dyn Handler>,
}

impl HandlerEntry {
    /// Wrap a handler, enabled.
    pub fn new(meta: HandlerMeta, handler: impl Handler + 'static) -> Self {
        Self::from_arc(meta, Arc::new(handler))
    }

    /// Wrap a boxed handler, enabled.
    pub fn from_box(meta: HandlerMeta, handler: Box<dyn Handler>) -> Self {
        Self::from_arc(meta, Arc::from(handler))
    }

    /// Wrap a shared handler, enabled.
    pub fn from_arc(meta: HandlerMeta, handler: Arc<dyn Handler>) -> Self {
        Self {
            meta,
            enabled: true,
            handler,
        }
    }

    /// The handler's name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The wrapped handler.
    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("meta", &self.meta)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// `hook_input.tool_name`, when present.
pub fn tool_name(payload: &Value) -> Option<&str> {
    payload.get("tool_name").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Always;

    impl Handler for Always {
        fn matches(&self, _payload: &Value) -> bool {
            true
        }

        fn handle(&self, _payload: &Value) -> Result<HookResult, HandlerError> {
            Ok(HookResult::allow())
        }
    }

    #[test]
    fn test_meta_defaults() {
        let meta = HandlerMeta::new("guard");
        assert_eq!(meta.priority, DEFAULT_PRIORITY);
        assert!(meta.terminal);
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn test_sort_key_orders_by_priority_then_name() {
        let a = HandlerMeta::new("b").with_priority(-5);
        let b = HandlerMeta::new("a").with_priority(0);
        let c = HandlerMeta::new("c").with_priority(0);
        let mut metas = vec![c.clone(), b.clone(), a.clone()];
        metas.sort_by(|x, y| x.sort_key().cmp(&y.sort_key()));
        let names: Vec<_> = metas.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_entry_debug_hides_handler() {
        let entry = HandlerEntry::new(HandlerMeta::new("always").with_tag("x"), Always);
        let debug = format!("{entry:?}");
        assert!(debug.contains("always"));
        assert!(entry.enabled);
        assert!(entry.meta.has_tag("x"));
    }

    #[test]
    fn test_tool_name() {
        assert_eq!(tool_name(&json!({"tool_name": "Bash"})), Some("Bash"));
        assert_eq!(tool_name(&json!({"tool_name": 3})), None);
        assert_eq!(tool_name(&json!({})), None);
    }
}
