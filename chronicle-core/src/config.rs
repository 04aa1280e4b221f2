//! Process-wide configuration.
//!
//! The active [`Configuration`] is an immutable value behind an atomically
//! swappable reference: reconfiguring installs a new `Arc`, never mutates the
//! current one. Tests checkpoint with [`Configuration::current`] and roll back
//! with [`Configuration::restore`] on teardown.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use once_cell::sync::Lazy;

use crate::{
    handler::MessageHandler, registry::EventTypeRegistry, repository::AggregateRepository,
};

static CURRENT: Lazy<RwLock<Arc<Configuration>>> =
    Lazy::new(|| RwLock::new(Arc::new(Configuration::default())));

/// The recognized process-wide options.
#[derive(Clone)]
pub struct Configuration {
    /// Ordered list of handlers receiving published events. Reconfiguring
    /// replaces the list wholesale; it never appends.
    pub event_handlers: Vec<Arc<MessageHandler>>,
    /// Suppress publication entirely during `commit_events`.
    pub disable_event_handlers: bool,
    /// Whether stores may cache the event type mapping. Uncached stores
    /// re-resolve against [`Self::event_types`] on every load.
    pub cache_event_types: bool,
    /// The registry stores resolve `event_type` strings against.
    pub event_types: Arc<EventTypeRegistry>,
    /// The unit-of-work aggregate cache.
    pub aggregate_repository: Arc<AggregateRepository>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            event_handlers: Vec::new(),
            disable_event_handlers: false,
            cache_event_types: true,
            event_types: Arc::new(EventTypeRegistry::new()),
            aggregate_repository: Arc::new(AggregateRepository::new()),
        }
    }
}

impl Configuration {
    /// The currently installed configuration.
    #[must_use]
    pub fn current() -> Arc<Self> {
        Arc::clone(&CURRENT.read().expect("configuration lock poisoned"))
    }

    /// Install a new configuration, replacing the current one.
    pub fn install(config: Self) {
        *CURRENT.write().expect("configuration lock poisoned") = Arc::new(config);
    }

    /// Clone the current configuration, apply `f`, and install the result.
    pub fn configure(f: impl FnOnce(&mut Self)) {
        let mut next = Self::current().as_ref().clone();
        f(&mut next);
        Self::install(next);
    }

    /// Reinstall the defaults.
    pub fn reset() {
        Self::install(Self::default());
    }

    /// Swap a previously checkpointed configuration back in.
    pub fn restore(previous: Arc<Self>) {
        *CURRENT.write().expect("configuration lock poisoned") = previous;
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<&str> = self.event_handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("Configuration")
            .field("event_handlers", &handlers)
            .field("disable_event_handlers", &self.disable_event_handlers)
            .field("cache_event_types", &self.cache_event_types)
            .finish_non_exhaustive()
    }
}
