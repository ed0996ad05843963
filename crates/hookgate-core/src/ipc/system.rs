//! The `_system` sub-protocol: daemon introspection over the event socket.

use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use tracing::{Level, debug, info};

use super::server::IpcState;
use super::types::*;

/// Default number of entries returned by `get_logs`.
pub const DEFAULT_LOG_COUNT: usize = 100;

/// Hard cap on `get_logs` results.
pub const MAX_LOG_COUNT: usize = 1000;

/// Tracing target for operator markers.
pub const MARKER_TARGET: &str = "hookgate::marker";

/// Administrative actions understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    GetLogs,
    Health,
    Handlers,
    LogMarker,
}

impl SystemAction {
    /// The wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            SystemAction::GetLogs => "get_logs",
            SystemAction::Health => "health",
            SystemAction::Handlers => "handlers",
            SystemAction::LogMarker => "log_marker",
        }
    }
}

impl FromStr for SystemAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get_logs" => Ok(SystemAction::GetLogs),
            "health" => Ok(SystemAction::Health),
            "handlers" => Ok(SystemAction::Handlers),
            "log_marker" => Ok(SystemAction::LogMarker),
            other => Err(format!("Unknown system action: {other}")),
        }
    }
}

/// Run the action named in `params.action`.
pub fn dispatch(state: &IpcState, request_id: Option<String>, params: &Value) -> Reply {
    let action = match params.get("action").and_then(Value::as_str) {
        Some(name) => name.parse::<SystemAction>(),
        None => Err("Missing system action".to_string()),
    };
    if let Ok(action) = &action {
        debug!(action = action.as_str(), "system request");
    }

    let outcome = match action {
        Ok(SystemAction::GetLogs) => get_logs(state, params),
        Ok(SystemAction::Health) => to_result(health(state)),
        Ok(SystemAction::Handlers) => to_result(HandlersResponse {
            handlers: state.router.describe(),
        }),
        Ok(SystemAction::LogMarker) => to_result(log_marker(params)),
        Err(message) => Err(message),
    };

    match outcome {
        Ok(result) => Reply::System(SystemResponse { request_id, result }),
        Err(message) => Reply::Error(
            ErrorResponse::new(message)
                .with_event(SYSTEM_EVENT)
                .with_request_id(request_id),
        ),
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("Failed to serialize result: {e}"))
}

fn get_logs(state: &IpcState, params: &Value) -> Result<Value, String> {
    let count = match params.get("count") {
        None | Some(Value::Null) => DEFAULT_LOG_COUNT,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| "'count' must be a non-negative integer".to_string())?
            .min(MAX_LOG_COUNT as u64) as usize,
    };

    let min_level = match params.get("level") {
        None | Some(Value::Null) => None,
        Some(Value::String(level)) => Some(
            Level::from_str(level).map_err(|_| format!("Unknown log level: {level}"))?,
        ),
        Some(_) => return Err("'level' must be a string".to_string()),
    };

    let Some(logs) = &state.logs else {
        return Err("Log collection is not enabled".to_string());
    };

    let entries = logs
        .recent(count, min_level)
        .into_iter()
        .map(LogEntry::from)
        .collect();
    to_result(LogsResponse {
        entries,
        total: logs.len(),
    })
}

fn health(state: &IpcState) -> HealthResponse {
    HealthResponse::new(
        crate::build_info::current(),
        state.started_at.elapsed().as_secs_f64(),
        state.activity.active_requests(),
        state.router.stats(),
    )
}

fn log_marker(params: &Value) -> MarkerResponse {
    let message = params
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("marker")
        .to_string();
    info!(target: MARKER_TARGET, marker = true, "{message}");
    MarkerResponse {
        marked: true,
        message,
    }
}
