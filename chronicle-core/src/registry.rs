//! The event type registry.
//!
//! Stores resolve `event_type` strings back to concrete payload types through
//! an explicit registry built at startup: a mapping from the type string to a
//! deserializer function plus the payload's `TypeId`. Registration is
//! idempotent and re-registration replaces the entry, which stores running in
//! uncached mode observe on their next lookup.

use std::{
    any::TypeId,
    collections::HashMap,
    fmt,
    sync::RwLock,
};

use crate::event::{DynPayload, EventPayload};

type DeserializeFn = fn(&serde_json::Value) -> Result<DynPayload, serde_json::Error>;

/// A resolved registry entry: the payload's `TypeId` for handler dispatch and
/// the function that rebuilds it from stored JSON.
#[derive(Clone, Copy)]
pub struct EventTypeEntry {
    pub type_id: TypeId,
    deserialize: DeserializeFn,
}

impl EventTypeEntry {
    /// Deserialize a stored JSON payload into its registered concrete type.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` when the stored value does not match the
    /// registered payload shape.
    pub fn deserialize(&self, json: &serde_json::Value) -> Result<DynPayload, serde_json::Error> {
        (self.deserialize)(json)
    }
}

impl fmt::Debug for EventTypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTypeEntry")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// Registry mapping `event_type` strings to payload deserializers.
#[derive(Debug, Default)]
pub struct EventTypeRegistry {
    entries: RwLock<HashMap<String, EventTypeEntry>>,
}

impl EventTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload type under its [`EventPayload::TYPE`] identifier.
    ///
    /// Registering the same identifier again replaces the previous entry.
    pub fn register<P: EventPayload>(&self) {
        let entry = EventTypeEntry {
            type_id: TypeId::of::<P>(),
            deserialize: deserialize_payload::<P>,
        };
        self.entries
            .write()
            .expect("event type registry lock poisoned")
            .insert(P::TYPE.to_string(), entry);
    }

    /// Resolve a single event type against the live registry.
    #[must_use]
    pub fn lookup(&self, event_type: &str) -> Option<EventTypeEntry> {
        self.entries
            .read()
            .expect("event type registry lock poisoned")
            .get(event_type)
            .copied()
    }

    /// Copy the full mapping, for stores that cache event types.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, EventTypeEntry> {
        self.entries
            .read()
            .expect("event type registry lock poisoned")
            .clone()
    }
}

fn deserialize_payload<P: EventPayload>(
    json: &serde_json::Value,
) -> Result<DynPayload, serde_json::Error> {
    let payload: P = serde_json::from_value(json.clone())?;
    Ok(std::sync::Arc::new(payload))
}
