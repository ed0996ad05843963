//! Handler chain: the ordered set of handlers for one event type and the
//! dispatch algorithm that turns them into a single decision.
//!
//! Handlers run in `(priority, name)` order. The first matching terminal
//! handler decides the outcome and stops the run; every handler that ran
//! before it contributes its context lines. A handler that fails or panics
//! is isolated: its fault becomes a context line and dispatch continues.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::decision::{ChainExecutionResult, Decision, HookResult};
use crate::event::EventType;
use crate::handler::{HandlerEntry, HandlerError};

/// Errors from chain mutation.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("handler '{name}' is already registered for {event}")]
    DuplicateHandler { event: EventType, name: String },
}

/// Introspection view of one handler, as reported by `_system handlers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct HandlerDescription {
    pub name: String,
    pub priority: i32,
    pub terminal: bool,
    pub tags: Vec<String>,
    pub enabled: bool,
}

/// Ordered handlers for exactly one event type.
///
/// The sorted view is computed lazily on first use and thrown away by every
/// mutation. Mutation needs `&mut self`, so it cannot overlap a running
/// [`execute`](Self::execute) on the same chain.
#[derive(Debug)]
pub struct HandlerChain {
    event: EventType,
    entries: Vec<HandlerEntry>,
    /// Indices into `entries` of the enabled handlers, in execution order.
    order: OnceLock<Vec<usize>>,
}

impl HandlerChain {
    /// Create an empty chain.
    pub fn new(event: EventType) -> Self {
        Self {
            event,
            entries: Vec::new(),
            order: OnceLock::new(),
        }
    }

    /// The event type this chain serves.
    pub fn event(&self) -> EventType {
        self.event
    }

    /// Number of registered handlers, enabled or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a handler. Names are unique within a chain.
    pub fn add(&mut self, entry: HandlerEntry) -> Result<(), ChainError> {
        if self.get(entry.name()).is_some() {
            return Err(ChainError::DuplicateHandler {
                event: self.event,
                name: entry.name().to_string(),
            });
        }
        self.entries.push(entry);
        self.invalidate();
        Ok(())
    }

    /// Remove a handler by name.
    pub fn remove(&mut self, name: &str) -> Option<HandlerEntry> {
        let index = self.entries.iter().position(|e| e.name() == name)?;
        let removed = self.entries.remove(index);
        self.invalidate();
        Some(removed)
    }

    /// Enable or disable a handler. Returns `false` if it is not registered.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.name() == name) else {
            return false;
        };
        entry.enabled = enabled;
        self.invalidate();
        true
    }

    /// Change a handler's priority. Returns `false` if it is not registered.
    pub fn set_priority(&mut self, name: &str, priority: i32) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.name() == name) else {
            return false;
        };
        entry.meta.priority = priority;
        self.invalidate();
        true
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<&HandlerEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    /// Enabled handlers in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = &HandlerEntry> {
        self.order
            .get_or_init(|| self.compute_order())
            .iter()
            .map(|&i| &self.entries[i])
    }

    /// Every handler (including disabled ones) in `(priority, name)` order.
    pub fn describe(&self) -> Vec<HandlerDescription> {
        let mut entries: Vec<&HandlerEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.meta.sort_key().cmp(&b.meta.sort_key()));
        entries
            .into_iter()
            .map(|e| HandlerDescription {
                name: e.meta.name.clone(),
                priority: e.meta.priority,
                terminal: e.meta.terminal,
                tags: e.meta.tags.iter().cloned().collect(),
                enabled: e.enabled,
            })
            .collect()
    }

    fn invalidate(&mut self) {
        self.order.take();
    }

    fn compute_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].enabled)
            .collect();
        order.sort_by(|&a, &b| {
            self.entries[a]
                .meta
                .sort_key()
                .cmp(&self.entries[b].meta.sort_key())
        });
        order
    }

    /// Run the chain against a payload.
    ///
    /// Always terminates: each enabled handler is considered at most once.
    pub fn execute(&self, payload: &Value) -> ChainExecutionResult {
        let started = Instant::now();
        let mut context = Vec::new();
        let mut handlers_executed = Vec::new();
        let mut handlers_matched = Vec::new();
        let mut faults = 0;
        let mut terminator = None;

        for entry in self.ordered() {
            let name = entry.name();

            let matched = match guarded(|| entry.handler().matches(payload)) {
                Ok(matched) => matched,
                Err(message) => {
                    faults += 1;
                    warn!(
                        event = %self.event,
                        handler = name,
                        error = %message,
                        "handler match failed, treating as no match"
                    );
                    false
                }
            };
            if !matched {
                continue;
            }
            handlers_matched.push(name.to_string());

            let handled = guarded(|| entry.handler().handle(payload))
                .unwrap_or_else(|message| Err(HandlerError::Panicked(message)));
            handlers_executed.push(name.to_string());

            match handled {
                Ok(HookResult {
                    decision,
                    context: lines,
                    reason,
                    guidance,
                }) => {
                    context.extend(lines);
                    if entry.meta.terminal {
                        terminator = Some((name.to_string(), decision, reason, guidance));
                        break;
                    }
                }
                Err(err) => {
                    faults += 1;
                    warn!(
                        event = %self.event,
                        handler = name,
                        error = %err,
                        "handler failed, continuing"
                    );
                    context.push(format!("Handler '{name}' failed: {err}"));
                }
            }
        }

        let (result, terminated_by) = match terminator {
            Some((name, decision, reason, guidance)) => (
                HookResult {
                    decision,
                    context,
                    reason,
                    guidance,
                },
                Some(name),
            ),
            None => (
                HookResult {
                    decision: Decision::Allow,
                    context,
                    reason: None,
                    guidance: None,
                },
                None,
            ),
        };

        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            event = %self.event,
            decision = %result.decision,
            terminated_by = terminated_by.as_deref().unwrap_or("-"),
            executed = handlers_executed.len(),
            execution_time_ms,
            "chain executed"
        );

        ChainExecutionResult {
            result,
            handlers_executed,
            handlers_matched,
            execution_time_ms,
            terminated_by,
            faults,
        }
    }
}

/// Run `f`, turning a panic into its message.
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Handler, HandlerMeta};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<String>>>;

    enum Outcome {
        Result(HookResult),
        Fail(&'static str),
        Panic(&'static str),
    }

    struct Probe {
        name: &'static str,
        matches: bool,
        panic_in_match: bool,
        outcome: Outcome,
        calls: CallLog,
    }

    impl Handler for Probe {
        fn matches(&self, _payload: &Value) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(format!("matches:{}", self.name));
            if self.panic_in_match {
                panic!("match exploded");
            }
            self.matches
        }

        fn handle(&self, _payload: &Value) -> Result<HookResult, HandlerError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("handle:{}", self.name));
            match &self.outcome {
                Outcome::Result(r) => Ok(r.clone()),
                Outcome::Fail(msg) => Err(HandlerError::failed(*msg)),
                Outcome::Panic(msg) => panic!("{}", msg),
            }
        }
    }

    struct Fixture {
        chain: HandlerChain,
        calls: CallLog,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                chain: HandlerChain::new(EventType::PreToolUse),
                calls: Arc::default(),
            }
        }

        fn add(&mut self, name: &'static str, priority: i32, terminal: bool, outcome: Outcome) {
            self.add_probe(name, priority, terminal, true, false, outcome);
        }

        fn add_probe(
            &mut self,
            name: &'static str,
            priority: i32,
            terminal: bool,
            matches: bool,
            panic_in_match: bool,
            outcome: Outcome,
        ) {
            let probe = Probe {
                name,
                matches,
                panic_in_match,
                outcome,
                calls: Arc::clone(&self.calls),
            };
            let meta = HandlerMeta::new(name)
                .with_priority(priority)
                .with_terminal(terminal);
            self.chain.add(HandlerEntry::new(meta, probe)).unwrap();
        }

        fn handled(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| c.strip_prefix("handle:").map(str::to_string))
                .collect()
        }

        fn touched(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn ctx(line: &str) -> Outcome {
        Outcome::Result(HookResult::new(Decision::Continue).with_context(line))
    }

    #[test]
    fn test_empty_chain_allows() {
        let chain = HandlerChain::new(EventType::Stop);
        let execution = chain.execute(&json!({}));
        assert_eq!(execution.decision(), Decision::Allow);
        assert!(execution.handlers_executed.is_empty());
        assert!(execution.handlers_matched.is_empty());
        assert_eq!(execution.terminated_by, None);
        assert!(execution.result.context.is_empty());
    }

    #[test]
    fn test_distinct_priorities_run_ascending() {
        let mut f = Fixture::new();
        f.add("late", 90, false, ctx("late"));
        f.add("early", -10, false, ctx("early"));
        f.add("middle", 0, false, ctx("middle"));

        let execution = f.chain.execute(&json!({}));
        assert_eq!(f.handled(), vec!["early", "middle", "late"]);
        assert_eq!(execution.handlers_executed, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_equal_priorities_break_ties_by_name() {
        let mut f = Fixture::new();
        f.add("charlie", 50, false, ctx("c"));
        f.add("alpha", 50, false, ctx("a"));
        f.add("bravo", 50, false, ctx("b"));

        f.chain.execute(&json!({}));
        assert_eq!(f.handled(), vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_terminal_handler_short_circuits() {
        let mut f = Fixture::new();
        f.add("A", 50, false, ctx("from A"));
        f.add("B", 10, false, ctx("from B"));
        f.add(
            "C",
            30,
            true,
            Outcome::Result(HookResult::deny("blocked").with_context("from C")),
        );

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.handlers_executed, vec!["B", "C"]);
        assert_eq!(execution.handlers_matched, vec!["B", "C"]);
        assert_eq!(execution.decision(), Decision::Deny);
        assert_eq!(execution.terminated_by.as_deref(), Some("C"));
        assert_eq!(execution.result.reason.as_deref(), Some("blocked"));
        assert!(
            !f.touched().iter().any(|c| c.ends_with(":A")),
            "A must not be matched or handled"
        );
    }

    #[test]
    fn test_context_accumulates_in_execution_order() {
        let mut f = Fixture::new();
        f.add("one", 1, false, ctx("first"));
        f.add("two", 2, false, ctx("second"));
        f.add(
            "three",
            3,
            true,
            Outcome::Result(HookResult::ask("confirm").with_context("third")),
        );

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.result.context, vec!["first", "second", "third"]);
        assert_eq!(execution.decision(), Decision::Ask);
    }

    #[test]
    fn test_non_terminal_decisions_do_not_leak() {
        let mut f = Fixture::new();
        f.add(
            "advisor",
            1,
            false,
            Outcome::Result(HookResult::deny("ignored").with_context("note")),
        );

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.decision(), Decision::Allow);
        assert_eq!(execution.result.reason, None);
        assert_eq!(execution.result.context, vec!["note"]);
        assert_eq!(execution.terminated_by, None);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let mut f = Fixture::new();
        f.add("H", 10, true, Outcome::Fail("boom"));
        f.add("after", 20, false, ctx("still ran"));

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.handlers_executed, vec!["H", "after"]);
        assert_eq!(execution.faults, 1);
        assert_eq!(execution.decision(), Decision::Allow);
        assert!(execution.result.context[0].contains("boom"));
        assert!(execution.result.context[0].contains("'H'"));
        assert_eq!(execution.result.context[1], "still ran");
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let mut f = Fixture::new();
        f.add("H", 10, true, Outcome::Panic("boom"));
        f.add(
            "guard",
            20,
            true,
            Outcome::Result(HookResult::deny("guarded")),
        );

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.handlers_executed, vec!["H", "guard"]);
        assert_eq!(execution.decision(), Decision::Deny);
        assert_eq!(execution.terminated_by.as_deref(), Some("guard"));
        assert!(execution.result.context[0].contains("boom"));
    }

    #[test]
    fn test_match_panic_is_treated_as_no_match() {
        let mut f = Fixture::new();
        f.add_probe("flaky", 1, true, true, true, ctx("never"));
        f.add("next", 2, false, ctx("next ran"));

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.handlers_matched, vec!["next"]);
        assert_eq!(execution.handlers_executed, vec!["next"]);
        assert_eq!(execution.faults, 1);
        assert_eq!(execution.result.context, vec!["next ran"]);
    }

    #[test]
    fn test_non_matching_handlers_are_skipped() {
        let mut f = Fixture::new();
        f.add_probe("skip", 1, true, false, false, Outcome::Fail("unreachable"));
        f.add("run", 2, false, ctx("ran"));

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.handlers_matched, vec!["run"]);
        assert_eq!(f.handled(), vec!["run"]);
    }

    #[test]
    fn test_disabled_handlers_do_not_run() {
        let mut f = Fixture::new();
        f.add("off", 1, true, Outcome::Result(HookResult::deny("no")));
        f.add("on", 2, false, ctx("on"));
        assert!(f.chain.set_enabled("off", false));

        let execution = f.chain.execute(&json!({}));
        assert_eq!(execution.handlers_executed, vec!["on"]);
        assert_eq!(f.chain.len(), 2);
        assert!(!f.chain.describe()[0].enabled);
    }

    #[test]
    fn test_mutation_invalidates_sorted_view() {
        let mut f = Fixture::new();
        f.add("x", 1, false, ctx("x"));
        f.add("y", 2, false, ctx("y"));
        let before: Vec<_> = f.chain.ordered().map(|e| e.name().to_string()).collect();
        assert_eq!(before, vec!["x", "y"]);

        assert!(f.chain.set_priority("x", 3));
        let after: Vec<_> = f.chain.ordered().map(|e| e.name().to_string()).collect();
        assert_eq!(after, vec!["y", "x"]);

        assert!(f.chain.remove("y").is_some());
        let removed: Vec<_> = f.chain.ordered().map(|e| e.name().to_string()).collect();
        assert_eq!(removed, vec!["x"]);
        assert!(!f.chain.set_priority("y", 1));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut f = Fixture::new();
        f.add("dup", 1, false, ctx("a"));
        let probe = Probe {
            name: "dup",
            matches: true,
            panic_in_match: false,
            outcome: ctx("b"),
            calls: Arc::clone(&f.calls),
        };
        let err = f
            .chain
            .add(HandlerEntry::new(HandlerMeta::new("dup"), probe))
            .unwrap_err();
        assert!(err.to_string().contains("dup"));
    }

    #[test]
    fn test_each_handler_runs_at_most_once() {
        let mut f = Fixture::new();
        for name in ["a", "b", "c", "d"] {
            f.add(name, 5, false, ctx(name));
        }
        f.chain.execute(&json!({}));
        let calls = f.touched();
        assert_eq!(calls.len(), 8);
    }
}
