use serde::Deserialize;
use serde_json::Value;

use crate::decision::{Decision, HookResult};
use crate::handler::{Handler, HandlerError};

pub(super) const NAME: &str = "context-lines";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    lines: Vec<String>,
}

/// Adds fixed context lines to every event it sees.
#[derive(Debug)]
pub struct ContextLines {
    lines: Vec<String>,
}

impl ContextLines {
    /// Add `lines` to the context of every event.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl Handler for ContextLines {
    fn matches(&self, _payload: &Value) -> bool {
        !self.lines.is_empty()
    }

    fn handle(&self, _payload: &Value) -> Result<HookResult, HandlerError> {
        Ok(HookResult {
            decision: Decision::Continue,
            context: self.lines.clone(),
            reason: None,
            guidance: None,
        })
    }
}

pub(super) fn construct(options: &Value) -> Result<Box<dyn Handler>, HandlerError> {
    let options: Options = super::parse_options(NAME, options)?;
    Ok(Box::new(ContextLines::new(options.lines)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adds_configured_lines() {
        let handler = construct(&json!({"lines": ["repo uses cargo", "no force pushes"]})).unwrap();
        assert!(handler.matches(&json!({})));
        let result = handler.handle(&json!({})).unwrap();
        assert_eq!(result.context, vec!["repo uses cargo", "no force pushes"]);
        assert_eq!(result.decision, Decision::Continue);
    }

    #[test]
    fn test_empty_lines_never_match() {
        let handler = ContextLines::new(Vec::<String>::new());
        assert!(!handler.matches(&json!({})));
    }

    #[test]
    fn test_rejects_unknown_options() {
        assert!(construct(&json!({"lines": [], "colour": "red"})).is_err());
    }
}
