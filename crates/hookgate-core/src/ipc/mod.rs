//! Daemon IPC: newline-delimited JSON over a Unix domain socket.
//!
//! Hook forwarders send one event per connection; the CLI uses the reserved
//! `_system` event for introspection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐         Unix socket        ┌──────────────┐
//! │  hooks   │───────────────────────────▶│  IPC Server  │
//! │   CLI    │  one JSON line each way    │  + _system   │
//! └──────────┘                            └──────┬───────┘
//!                                                │
//!                                         ┌──────▼───────┐
//!                                         │    Router    │
//!                                         │ HandlerChain │
//!                                         └──────────────┘
//! ```

pub mod client;
pub mod server;
pub mod system;
pub mod types;

pub use client::{IpcClient, IpcClientError};
pub use server::{Activity, DEFAULT_SOCKET_PATH, IpcState};
pub use types::*;
