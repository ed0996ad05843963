#![deny(unsafe_code)]

//! hookgate core: handler chain dispatch engine and IPC daemon runtime.
//!
//! The daemon receives lifecycle events from a coding-agent tool over a Unix
//! socket, runs the ordered [`HandlerChain`] registered for the event type and
//! replies with the resulting decision. Short-lived client processes forward
//! exactly one event per connection.
//!
//! ```text
//! ┌──────────┐   one JSON line    ┌──────────────┐   EventType   ┌──────────────┐
//! │  client  │───────────────────▶│  IPC server  │──────────────▶│    Router    │
//! │ (hook)   │◀───────────────────│  + _system   │◀──────────────│ HandlerChain │
//! └──────────┘   one JSON line    └──────────────┘   decision    └──────────────┘
//! ```

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Ordered handler chains and the dispatch algorithm.
pub mod chain;
/// Daemon lifecycle: startup, idle monitor, signals, graceful shutdown.
pub mod daemon;
/// Decisions and execution results.
pub mod decision;
/// Known lifecycle event types.
pub mod event;
/// The handler capability contract and handler metadata.
pub mod handler;
/// Built-in generic handlers and their registration table.
pub mod handlers;
/// Newline-delimited JSON protocol, server, client and system sub-protocol.
pub mod ipc;
/// In-memory log sink backing `get_logs`.
pub mod logging;
/// PID file bookkeeping and stale-process detection.
pub mod pidfile;
/// Static handler registration table and chain composition.
pub mod registry;
/// Event-type to chain routing with aggregated counters.
pub mod router;
/// Per-event input validation gate.
pub mod validation;

pub use chain::HandlerChain;
pub use daemon::{Daemon, DaemonContext, DaemonError, DaemonOptions};
pub use decision::{ChainExecutionResult, Decision, HookResult};
pub use event::EventType;
pub use handler::{Handler, HandlerEntry, HandlerError, HandlerMeta};
pub use logging::{LogCollector, LogReader};
pub use registry::HandlerRegistry;
pub use router::Router;
pub use validation::ValidationGate;
