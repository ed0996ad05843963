#![deny(unsafe_code)]

//! Shared test utilities for the hookgate workspace.
//!
//! Provides reusable fixtures, config builders, scripted handlers and tracing
//! helpers so that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! hookgate-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod handlers;
pub mod tracing_setup;
