//! Message handler dispatch.
//!
//! A [`MessageHandler`] maps concrete payload types to callbacks. Projectors
//! and workflows are both expressed this way: the handler declares its
//! `(payload type, callback)` pairs at construction and the publisher (or the
//! replay path) routes each event to the callback registered for its payload's
//! concrete type. Events with no registered callback are skipped silently.

use std::{any::TypeId, collections::HashMap, fmt, sync::Arc};

use crate::event::{Event, EventPayload};

/// Error type surfaced by handler callbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for handler callbacks.
pub type HandlerResult = Result<(), HandlerError>;

/// A callback shared between one or more payload type registrations.
pub type SharedCallback = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

/// An event handler with a per-payload-type dispatch table.
pub struct MessageHandler {
    name: String,
    callbacks: HashMap<TypeId, SharedCallback>,
}

impl MessageHandler {
    /// Start building a handler. The name identifies the handler in
    /// [`PublishEventError`](crate::publisher::PublishEventError)s.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> MessageHandlerBuilder {
        MessageHandlerBuilder {
            name: name.into(),
            callbacks: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a callback is registered for the message's concrete payload
    /// type.
    #[must_use]
    pub fn handles_message(&self, event: &Event) -> bool {
        self.callbacks.contains_key(&event.payload_type_id())
    }

    /// Dispatch a single event.
    ///
    /// Events without a registered callback are ignored.
    ///
    /// # Errors
    ///
    /// Propagates the callback's error unchanged; wrapping happens at the
    /// publisher.
    pub fn handle_message(&self, event: &Event) -> HandlerResult {
        match self.callbacks.get(&event.payload_type_id()) {
            Some(callback) => callback(event),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandler")
            .field("name", &self.name)
            .field("registered_types", &self.callbacks.len())
            .finish_non_exhaustive()
    }
}

/// Builder collecting `(payload type, callback)` pairs.
pub struct MessageHandlerBuilder {
    name: String,
    callbacks: HashMap<TypeId, SharedCallback>,
}

impl MessageHandlerBuilder {
    /// Register a typed callback for payload type `P`.
    #[must_use]
    pub fn on<P, F>(mut self, callback: F) -> Self
    where
        P: EventPayload,
        F: Fn(&P, &Event) -> HandlerResult + Send + Sync + 'static,
    {
        let callback: SharedCallback = Arc::new(move |event: &Event| {
            let Some(payload) = event.payload::<P>() else {
                return Ok(());
            };
            callback(payload, event)
        });
        self.callbacks.insert(TypeId::of::<P>(), callback);
        self
    }

    /// Register an untyped callback for payload type `P`.
    ///
    /// The same [`SharedCallback`] can be registered under several payload
    /// types, so a group of event classes can share one callback.
    #[must_use]
    pub fn on_shared<P: EventPayload>(mut self, callback: SharedCallback) -> Self {
        self.callbacks.insert(TypeId::of::<P>(), callback);
        self
    }

    #[must_use]
    pub fn build(self) -> MessageHandler {
        MessageHandler {
            name: self.name,
            callbacks: self.callbacks,
        }
    }
}
