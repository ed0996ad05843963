//! Event-type routing with aggregate counters.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::{HandlerChain, HandlerDescription};
use crate::decision::ChainExecutionResult;
use crate::event::EventType;

/// One chain per event type, created empty for every known type.
#[derive(Debug)]
pub struct Router {
    chains: BTreeMap<EventType, HandlerChain>,
    stats: RouterStats,
}

#[derive(Debug, Default)]
struct RouterStats {
    total_requests: AtomicU64,
    handler_faults: AtomicU64,
    decisions: Mutex<BTreeMap<String, u64>>,
    events: Mutex<BTreeMap<String, u64>>,
}

/// Point-in-time copy of the router counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStatsSnapshot {
    pub total_requests: u64,
    pub handler_faults: u64,
    pub decisions: BTreeMap<String, u64>,
    pub events: BTreeMap<String, u64>,
    pub handlers_registered: usize,
}

impl Router {
    /// A router with an empty chain for every known event type.
    pub fn new() -> Self {
        let chains = EventType::ALL
            .into_iter()
            .map(|event| (event, HandlerChain::new(event)))
            .collect();
        Self {
            chains,
            stats: RouterStats::default(),
        }
    }

    /// The chain for `event`.
    pub fn chain(&self, event: EventType) -> Option<&HandlerChain> {
        self.chains.get(&event)
    }

    /// Mutable access to the chain for `event`.
    pub fn chain_mut(&mut self, event: EventType) -> Option<&mut HandlerChain> {
        self.chains.get_mut(&event)
    }

    /// Dispatch a payload to the chain for `event` and record the outcome.
    pub fn route(&self, event: EventType, payload: &Value) -> ChainExecutionResult {
        let execution = match self.chains.get(&event) {
            Some(chain) => chain.execute(payload),
            // Every known event has a chain; this only guards a router built
            // by hand.
            None => HandlerChain::new(event).execute(payload),
        };
        self.record(event, &execution);
        execution
    }

    fn record(&self, event: EventType, execution: &ChainExecutionResult) {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        self.stats
            .handler_faults
            .fetch_add(execution.faults as u64, Ordering::Relaxed);
        if let Ok(mut decisions) = self.stats.decisions.lock() {
            *decisions
                .entry(execution.decision().as_str().to_string())
                .or_default() += 1;
        }
        if let Ok(mut events) = self.stats.events.lock() {
            *events.entry(event.as_str().to_string()).or_default() += 1;
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            handler_faults: self.stats.handler_faults.load(Ordering::Relaxed),
            decisions: self
                .stats
                .decisions
                .lock()
                .map(|d| d.clone())
                .unwrap_or_default(),
            events: self
                .stats
                .events
                .lock()
                .map(|e| e.clone())
                .unwrap_or_default(),
            handlers_registered: self.handler_count(),
        }
    }

    /// Registered handlers per event type. Event types with no handlers are
    /// omitted.
    pub fn describe(&self) -> BTreeMap<String, Vec<HandlerDescription>> {
        self.chains
            .iter()
            .filter(|(_, chain)| !chain.is_empty())
            .map(|(event, chain)| (event.as_str().to_string(), chain.describe()))
            .collect()
    }

    /// Total handlers across all chains.
    pub fn handler_count(&self) -> usize {
        self.chains.values().map(HandlerChain::len).sum()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
