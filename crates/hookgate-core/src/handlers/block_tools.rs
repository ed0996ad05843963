use serde::Deserialize;
use serde_json::Value;

use crate::decision::HookResult;
use crate::handler::{Handler, HandlerError, tool_name};

pub(super) const NAME: &str = "block-tools";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Options {
    tools: Vec<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    guidance: Option<String>,
}

/// Denies tool calls whose `tool_name` is in a configured list.
#[derive(Debug)]
pub struct BlockTools {
    tools: Vec<String>,
    reason: Option<String>,
    guidance: Option<String>,
}

impl BlockTools {
    /// Block the given tool names.
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
            reason: None,
            guidance: None,
        }
    }

    /// Replace the default deny reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach guidance to every denial.
    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }
}

impl Handler for BlockTools {
    fn matches(&self, payload: &Value) -> bool {
        tool_name(payload).is_some_and(|name| self.tools.iter().any(|t| t == name))
    }

    fn handle(&self, payload: &Value) -> Result<HookResult, HandlerError> {
        let tool = tool_name(payload).unwrap_or("unknown");
        let reason = self
            .reason
            .clone()
            .unwrap_or_else(|| format!("Tool '{tool}' is blocked by policy"));
        let mut result = HookResult::deny(reason);
        if let Some(guidance) = &self.guidance {
            result = result.with_guidance(guidance.clone());
        }
        Ok(result)
    }
}

pub(super) fn construct(options: &Value) -> Result<Box<dyn Handler>, HandlerError> {
    let options: Options = super::parse_options(NAME, options)?;
    let mut handler = BlockTools::new(options.tools);
    handler.reason = options.reason;
    handler.guidance = options.guidance;
    Ok(Box::new(handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Decision;
    use serde_json::json;

    #[test]
    fn test_matches_listed_tools_only() {
        let handler = BlockTools::new(["Bash", "WebFetch"]);
        assert!(handler.matches(&json!({"tool_name": "Bash"})));
        assert!(!handler.matches(&json!({"tool_name": "Read"})));
        assert!(!handler.matches(&json!({"prompt": "hi"})));
    }

    #[test]
    fn test_denies_with_default_reason() {
        let handler = BlockTools::new(["Bash"]);
        let result = handler.handle(&json!({"tool_name": "Bash"})).unwrap();
        assert_eq!(result.decision, Decision::Deny);
        assert!(result.reason.unwrap().contains("Bash"));
        assert_eq!(result.guidance, None);
    }

    #[test]
    fn test_construct_from_options() {
        let handler = construct(&json!({
            "tools": ["Bash"],
            "reason": "no shell here",
            "guidance": "use the Read tool"
        }))
        .unwrap();
        let result = handler.handle(&json!({"tool_name": "Bash"})).unwrap();
        assert_eq!(result.reason.as_deref(), Some("no shell here"));
        assert_eq!(result.guidance.as_deref(), Some("use the Read tool"));
    }

    #[test]
    fn test_construct_requires_tools() {
        let err = construct(&json!({})).err().expect("expected construct to fail");
        assert!(matches!(err, HandlerError::InvalidOptions { .. }));
        assert!(err.to_string().contains("tools"));
    }
}
