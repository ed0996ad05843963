//! Wire types for the newline-delimited JSON protocol.
//!
//! One request line in, one response line out, per connection. Both the
//! server (daemon) and the client (CLI, hook forwarder) use these types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::build_info::BuildInfo;
use crate::chain::HandlerDescription;
use crate::decision::ChainExecutionResult;
use crate::router::RouterStatsSnapshot;

/// Reserved event name for the administrative sub-protocol.
pub const SYSTEM_EVENT: &str = "_system";

/// Upper bound on a single request line.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// A request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub event: String,
    pub hook_input: Value,
}

impl HookRequest {
    /// A request for an ordinary event.
    pub fn new(event: impl Into<String>, hook_input: Value) -> Self {
        Self {
            request_id: None,
            event: event.into(),
            hook_input,
        }
    }

    /// A `_system` request for `action` with extra parameters merged into
    /// `hook_input`.
    pub fn system(action: &str, params: Value) -> Self {
        let mut input = match params {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        input.insert("action".to_string(), Value::String(action.to_string()));
        Self::new(SYSTEM_EVENT, Value::Object(input))
    }

    /// Set the correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Whether this targets the `_system` sub-protocol.
    pub fn is_system(&self) -> bool {
        self.event == SYSTEM_EVENT
    }
}

/// Reasons a request line is rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty request")]
    Empty,

    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    #[error("Request must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Request exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Request timed out")]
    Timeout,
}

/// A rejected request, with whatever identifying fields could be salvaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRejection {
    pub error: ProtocolError,
    pub request_id: Option<String>,
    pub event: Option<String>,
}

impl From<ProtocolError> for ProtocolRejection {
    fn from(error: ProtocolError) -> Self {
        Self {
            error,
            request_id: None,
            event: None,
        }
    }
}

/// Parse and shape-check one request line.
pub fn parse_request(line: &str) -> Result<HookRequest, ProtocolRejection> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty.into());
    }

    let value: Value =
        serde_json::from_str(line).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::NotAnObject.into());
    };

    let request_id = object
        .get("request_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let event = object.get("event").and_then(Value::as_str).map(str::to_string);
    let reject = |error| ProtocolRejection {
        error,
        request_id: request_id.clone(),
        event: event.clone(),
    };

    let event_name = match object.get("event") {
        None | Some(Value::Null) => return Err(reject(ProtocolError::MissingField("event"))),
        Some(Value::String(name)) => name.clone(),
        Some(_) => {
            return Err(reject(ProtocolError::InvalidField {
                field: "event",
                expected: "a string",
            }));
        }
    };

    let hook_input = match object.remove("hook_input") {
        None | Some(Value::Null) => {
            return Err(reject(ProtocolError::MissingField("hook_input")));
        }
        Some(input @ Value::Object(_)) => input,
        Some(_) => {
            return Err(reject(ProtocolError::InvalidField {
                field: "hook_input",
                expected: "an object",
            }));
        }
    };

    Ok(HookRequest {
        request_id,
        event: event_name,
        hook_input,
    })
}

/// Error response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// An error response with only a message.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            event: None,
            request_id: None,
        }
    }

    /// Attach detail lines.
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }

    /// Name the event the error relates to.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Echo the request's correlation id, if any.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

impl From<ProtocolRejection> for ErrorResponse {
    fn from(rejection: ProtocolRejection) -> Self {
        Self {
            error: rejection.error.to_string(),
            details: None,
            event: rejection.event,
            request_id: rejection.request_id,
        }
    }
}

/// Response to an ordinary event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub execution: ChainExecutionResult,
}

/// Response to a `_system` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub result: Value,
}

/// Any response line the server writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Hook(HookResponse),
    System(SystemResponse),
    Error(ErrorResponse),
}

impl Reply {
    /// Serialize as one line, without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("Failed to serialize response: {e}") })
                .to_string()
        })
    }

    /// Whether this is an error response.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

/// Log entry as returned by `get_logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl From<crate::logging::LogEntry> for LogEntry {
    fn from(entry: crate::logging::LogEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            level: entry.level.to_string(),
            target: entry.target,
            message: entry.message,
            fields: entry.fields,
        }
    }
}

/// `get_logs` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsResponse {
    pub entries: Vec<LogEntry>,
    /// Entries held in the buffer, before filtering.
    pub total: usize,
}

/// `health` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub pid: u32,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
    pub uptime_secs: f64,
    pub active_requests: usize,
    pub stats: RouterStatsSnapshot,
}

impl HealthResponse {
    pub(crate) fn new(
        build: BuildInfo,
        uptime_secs: f64,
        active_requests: usize,
        stats: RouterStatsSnapshot,
    ) -> Self {
        Self {
            status: "ok".to_string(),
            pid: std::process::id(),
            version: build.version.to_string(),
            git_hash: build.git_hash.to_string(),
            build_profile: build.profile.to_string(),
            uptime_secs,
            active_requests,
            stats,
        }
    }
}

/// `handlers` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlersResponse {
    pub handlers: BTreeMap<String, Vec<HandlerDescription>>,
}

/// `log_marker` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerResponse {
    pub marked: bool,
    pub message: String,
}
