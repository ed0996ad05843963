//! Scripted handlers for exercising chains and daemons.
//!
//! A [`ScriptedHandler`] returns a fixed outcome and records every call in a
//! shared [`CallLog`], so tests can assert exactly which handlers ran and in
//! what order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hookgate_core::{Handler, HandlerEntry, HandlerError, HandlerMeta, HookResult};
use serde_json::Value;

/// Ordered record of handler calls, shared between handlers.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Names of handlers whose `handle` ran, in order.
    pub fn handled(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| c.strip_prefix("handle:").map(str::to_string))
            .collect()
    }

    /// Every recorded call, `matches:<name>` and `handle:<name>`.
    pub fn all(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

/// What a scripted handler does when invoked.
#[derive(Debug, Clone)]
pub enum Outcome {
    Return(HookResult),
    Fail(String),
    Panic(String),
    /// Sleep, then return the result.
    Slow(Duration, HookResult),
}

/// A handler with a canned outcome.
#[derive(Debug, Clone)]
pub struct ScriptedHandler {
    name: String,
    matches: bool,
    outcome: Outcome,
    log: CallLog,
}

impl ScriptedHandler {
    /// A handler that always matches and behaves per `outcome`, recording calls in `log`.
    pub fn new(name: &str, outcome: Outcome, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            matches: true,
            outcome,
            log: log.clone(),
        }
    }

    /// Never match, so the handler is never run.
    pub fn never_matching(mut self) -> Self {
        self.matches = false;
        self
    }

    /// Wrap into a chain entry with the given ordering metadata.
    pub fn entry(self, priority: i32, terminal: bool) -> HandlerEntry {
        let meta = HandlerMeta::new(self.name.clone())
            .with_priority(priority)
            .with_terminal(terminal);
        HandlerEntry::new(meta, self)
    }
}

impl Handler for ScriptedHandler {
    fn matches(&self, _payload: &Value) -> bool {
        self.log.push(format!("matches:{}", self.name));
        self.matches
    }

    fn handle(&self, _payload: &Value) -> Result<HookResult, HandlerError> {
        self.log.push(format!("handle:{}", self.name));
        match &self.outcome {
            Outcome::Return(result) => Ok(result.clone()),
            Outcome::Fail(message) => Err(HandlerError::failed(message.clone())),
            Outcome::Panic(message) => panic!("{}", message),
            Outcome::Slow(delay, result) => {
                std::thread::sleep(*delay);
                Ok(result.clone())
            }
        }
    }
}
