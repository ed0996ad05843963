//! Decisions returned by handlers and the bookkeeping of one chain run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Let the underlying call proceed.
    Allow,
    /// Block the underlying call.
    Deny,
    /// Escalate to the user.
    Ask,
    /// No opinion; let the agent continue.
    Continue,
}

impl Decision {
    /// The lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::Ask => "ask",
            Decision::Continue => "continue",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler (or a whole chain) decided.
///
/// `reason` is only meaningful on the result of the handler that terminated
/// the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResult {
    pub decision: Decision,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub guidance: Option<String>,
}

impl HookResult {
    /// A result with the given decision and nothing else.
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            context: Vec::new(),
            reason: None,
            guidance: None,
        }
    }

    /// An allow result.
    pub fn allow() -> Self {
        Self::new(Decision::Allow)
    }

    /// A deny result with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::new(Decision::Deny).with_reason(reason)
    }

    /// An ask result with a reason.
    pub fn ask(reason: impl Into<String>) -> Self {
        Self::new(Decision::Ask).with_reason(reason)
    }

    /// Append a context line.
    pub fn with_context(mut self, line: impl Into<String>) -> Self {
        self.context.push(line.into());
        self
    }

    /// Set the reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set guidance for the agent.
    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }
}

impl Default for HookResult {
    fn default() -> Self {
        Self::allow()
    }
}

/// The decision of one chain run plus which handlers took part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainExecutionResult {
    #[serde(flatten)]
    pub result: HookResult,
    pub handlers_executed: Vec<String>,
    pub handlers_matched: Vec<String>,
    pub execution_time_ms: f64,
    pub terminated_by: Option<String>,
    /// Number of isolated handler faults during the run.
    #[serde(skip)]
    pub faults: usize,
}

impl ChainExecutionResult {
    /// The chain's final decision.
    pub fn decision(&self) -> Decision {
        self.result.decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decision_wire_format() {
        assert_eq!(serde_json::to_string(&Decision::Deny).unwrap(), "\"deny\"");
        let parsed: Decision = serde_json::from_str("\"continue\"").unwrap();
        assert_eq!(parsed, Decision::Continue);
    }

    #[test]
    fn test_builders() {
        let result = HookResult::deny("rm -rf")
            .with_context("checked by guard")
            .with_guidance("use trash instead");
        assert_eq!(result.decision, Decision::Deny);
        assert_eq!(result.reason.as_deref(), Some("rm -rf"));
        assert_eq!(result.context, vec!["checked by guard".to_string()]);
        assert_eq!(result.guidance.as_deref(), Some("use trash instead"));
    }

    #[test]
    fn test_execution_result_flattens_decision() {
        let execution = ChainExecutionResult {
            result: HookResult::allow(),
            handlers_executed: vec![],
            handlers_matched: vec![],
            execution_time_ms: 0.5,
            terminated_by: None,
            faults: 3,
        };
        let value = serde_json::to_value(&execution).unwrap();
        assert_eq!(value["decision"], "allow");
        assert!(value["reason"].is_null());
        assert!(value["terminated_by"].is_null());
        assert!(value.get("faults").is_none());
    }
}
