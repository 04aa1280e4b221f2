//! The domain event envelope and payload typing.
//!
//! An [`Event`] pairs a typed payload with the stream coordinates that place
//! it in an aggregate's history. The payload is serialized exactly once, at
//! construction, so the JSON representation travelling to the store is always
//! a JSON object rather than a double-encoded string.

use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use chrono::{DateTime, Timelike, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Marker trait for event payload types.
///
/// Each payload carries a stable [`Self::TYPE`] identifier used as the
/// `event_type` column value and as the registry key when rebuilding events
/// from stored rows.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;
}

/// Type-erased payload shared between the envelope and dispatch tables.
pub type DynPayload = Arc<dyn Any + Send + Sync>;

/// A domain event bound to a position in an aggregate's stream.
///
/// Sequence numbers start at 1 and are contiguous per aggregate; the store
/// relies on the `(aggregate_id, sequence_number)` primary key for optimistic
/// locking.
#[derive(Clone)]
pub struct Event {
    pub aggregate_id: Uuid,
    pub sequence_number: i32,
    pub created_at: DateTime<Utc>,
    event_type: String,
    json: serde_json::Value,
    payload: DynPayload,
}

impl Event {
    /// Build an event from a typed payload, serializing it to its stored JSON
    /// form.
    ///
    /// `created_at` is truncated to microsecond precision to match the
    /// `timestamptz` storage column, so a round-tripped event compares equal
    /// to the committed one.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the payload fails to serialize.
    pub fn new<P: EventPayload>(
        aggregate_id: Uuid,
        sequence_number: i32,
        created_at: DateTime<Utc>,
        payload: P,
    ) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_value(&payload)?;
        Ok(Self {
            aggregate_id,
            sequence_number,
            created_at: truncate_to_micros(created_at),
            event_type: P::TYPE.to_string(),
            json,
            payload: Arc::new(payload),
        })
    }

    /// Rebuild an event from its stored representation.
    ///
    /// Used by store implementations after resolving `event_type` through the
    /// [`registry`](crate::registry); not intended for application code.
    #[must_use]
    pub fn from_stored(
        aggregate_id: Uuid,
        sequence_number: i32,
        created_at: DateTime<Utc>,
        event_type: String,
        json: serde_json::Value,
        payload: DynPayload,
    ) -> Self {
        Self {
            aggregate_id,
            sequence_number,
            created_at: truncate_to_micros(created_at),
            event_type,
            json,
            payload,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The stored JSON form of the payload. Always a JSON object.
    #[must_use]
    pub fn json(&self) -> &serde_json::Value {
        &self.json
    }

    /// Downcast the payload to its concrete type.
    ///
    /// Returns `None` when the event carries a different payload type.
    #[must_use]
    pub fn payload<P: EventPayload>(&self) -> Option<&P> {
        self.payload.downcast_ref()
    }

    /// The `TypeId` of the concrete payload, used for handler dispatch.
    #[must_use]
    pub fn payload_type_id(&self) -> TypeId {
        (*self.payload).type_id()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("aggregate_id", &self.aggregate_id)
            .field("sequence_number", &self.sequence_number)
            .field("created_at", &self.created_at)
            .field("event_type", &self.event_type)
            .field("json", &self.json)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.aggregate_id == other.aggregate_id
            && self.sequence_number == other.sequence_number
            && self.created_at == other.created_at
            && self.event_type == other.event_type
            && self.json == other.json
    }
}

/// Drop sub-microsecond precision so in-memory timestamps match what
/// `timestamptz` columns can hold.
pub(crate) fn truncate_to_micros(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let micros = timestamp.nanosecond() / 1_000 * 1_000;
    timestamp.with_nanosecond(micros).unwrap_or(timestamp)
}
