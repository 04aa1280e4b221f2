//! Materialized aggregate state at a sequence number.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::event::truncate_to_micros;

/// A point-in-time snapshot of an aggregate.
///
/// Loading an aggregate replays only the events after the latest snapshot's
/// `sequence_number`.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub aggregate_id: Uuid,
    pub sequence_number: i32,
    pub created_at: DateTime<Utc>,
    pub snapshot_type: String,
    pub payload: serde_json::Value,
}

impl Snapshot {
    /// Build a snapshot from a typed aggregate state.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the state fails to serialize.
    pub fn new<T: Serialize>(
        aggregate_id: Uuid,
        sequence_number: i32,
        snapshot_type: impl Into<String>,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            aggregate_id,
            sequence_number,
            created_at: truncate_to_micros(Utc::now()),
            snapshot_type: snapshot_type.into(),
            payload: serde_json::to_value(state)?,
        })
    }
}
