//! Static handler registration and chain composition.
//!
//! Handlers are known at compile time. Each one contributes a
//! [`Registration`] (name, defaults, constructor) to a table; composition
//! walks the configured entries per event type and builds the [`Router`].

use std::collections::BTreeMap;

use hookgate_config::AppConfig;
use serde_json::Value;
use tracing::{debug, info};

use crate::chain::ChainError;
use crate::event::EventType;
use crate::handler::{DEFAULT_PRIORITY, Handler, HandlerEntry, HandlerError, HandlerMeta};
use crate::router::Router;

/// Builds a handler from its JSON options.
pub type Constructor = fn(&Value) -> Result<Box<dyn Handler>, HandlerError>;

/// A handler kind known to the daemon.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub name: &'static str,
    pub default_priority: i32,
    pub default_terminal: bool,
    pub default_tags: &'static [&'static str],
    pub constructor: Constructor,
}

impl Registration {
    /// A registration with priority 50, terminal, and no tags.
    pub const fn new(name: &'static str, constructor: Constructor) -> Self {
        Self {
            name,
            default_priority: DEFAULT_PRIORITY,
            default_terminal: true,
            default_tags: &[],
            constructor,
        }
    }

    /// Set the default priority.
    pub const fn priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    /// Set the default terminal flag.
    pub const fn terminal(mut self, terminal: bool) -> Self {
        self.default_terminal = terminal;
        self
    }

    /// Set the default tags.
    pub const fn tags(mut self, tags: &'static [&'static str]) -> Self {
        self.default_tags = tags;
        self
    }
}

/// Errors raised while composing chains from configuration.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("unknown event type in handler configuration: {0}")]
    UnknownEvent(String),

    #[error("unknown handler '{name}' configured for {event}")]
    UnknownHandler { event: EventType, name: String },

    #[error("failed to construct handler '{name}' for {event}: {source}")]
    Construct {
        event: EventType,
        name: String,
        #[source]
        source: HandlerError,
    },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Table of handler kinds, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    registrations: BTreeMap<&'static str, Registration>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in crate::handlers::BUILTINS {
            registry.register(*registration);
        }
        registry
    }

    /// Add or replace a registration.
    pub fn register(&mut self, registration: Registration) {
        self.registrations.insert(registration.name, registration);
    }

    /// Look up a registration by handler name.
    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.registrations.get(name)
    }

    /// Registered handler names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registrations.keys().copied()
    }

    /// Build a router from the handler entries in `config`.
    ///
    /// Disabled entries and entries rejected by the tag filters are skipped.
    /// A configured priority overrides the registration default; an absent
    /// one leaves the default in place.
    pub fn compose(&self, config: &AppConfig) -> Result<Router, CompositionError> {
        let mut router = Router::new();

        for (event_name, entries) in &config.handlers {
            let event: EventType = event_name
                .parse()
                .map_err(|_| CompositionError::UnknownEvent(event_name.clone()))?;

            for entry in entries {
                if !entry.enabled {
                    debug!(event = %event, handler = %entry.name, "handler disabled in config");
                    continue;
                }

                let registration =
                    self.get(&entry.name)
                        .ok_or_else(|| CompositionError::UnknownHandler {
                            event,
                            name: entry.name.clone(),
                        })?;

                let mut meta = HandlerMeta::new(registration.name)
                    .with_priority(entry.priority.unwrap_or(registration.default_priority))
                    .with_terminal(registration.default_terminal);
                for tag in registration.default_tags {
                    meta = meta.with_tag(*tag);
                }
                for tag in &entry.tags {
                    meta = meta.with_tag(tag.clone());
                }

                if !config.tags.admits(meta.tags.iter().map(String::as_str)) {
                    debug!(event = %event, handler = %entry.name, "handler excluded by tag filter");
                    continue;
                }

                let handler = (registration.constructor)(&entry.options_json()).map_err(
                    |source| CompositionError::Construct {
                        event,
                        name: entry.name.clone(),
                        source,
                    },
                )?;

                if let Some(chain) = router.chain_mut(event) {
                    chain.add(HandlerEntry::from_box(meta, handler))?;
                }
            }
        }

        info!(
            handlers = router.handler_count(),
            "handler chains composed"
        );
        Ok(router)
    }
}
