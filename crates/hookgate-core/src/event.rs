//! Lifecycle event types emitted by the coding-agent tool.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A lifecycle event type. The variant names are the wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    PreToolUse,
    PostToolUse,
    PermissionRequest,
    UserPromptSubmit,
    Notification,
    Stop,
    SubagentStop,
    PreCompact,
    SessionStart,
    SessionEnd,
}

impl EventType {
    /// Every known event type.
    pub const ALL: [EventType; 10] = [
        EventType::PreToolUse,
        EventType::PostToolUse,
        EventType::PermissionRequest,
        EventType::UserPromptSubmit,
        EventType::Notification,
        EventType::Stop,
        EventType::SubagentStop,
        EventType::PreCompact,
        EventType::SessionStart,
        EventType::SessionEnd,
    ];

    /// The wire name of this event type.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::PreToolUse => "PreToolUse",
            EventType::PostToolUse => "PostToolUse",
            EventType::PermissionRequest => "PermissionRequest",
            EventType::UserPromptSubmit => "UserPromptSubmit",
            EventType::Notification => "Notification",
            EventType::Stop => "Stop",
            EventType::SubagentStop => "SubagentStop",
            EventType::PreCompact => "PreCompact",
            EventType::SessionStart => "SessionStart",
            EventType::SessionEnd => "SessionEnd",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The event name did not match any known event type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_known_event() {
        for event in EventType::ALL {
            assert_eq!(event.as_str().parse::<EventType>().unwrap(), event);
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("pretooluse".parse::<EventType>().is_err());
        assert!("_system".parse::<EventType>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&EventType::SessionStart).unwrap();
        assert_eq!(json, "\"SessionStart\"");
    }
}
