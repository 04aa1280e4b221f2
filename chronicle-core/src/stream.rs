//! Stream identity records.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Commit-side description of an event stream.
///
/// `commit_events` upserts one `stream_records` row per descriptor: created
/// lazily on the first commit for an aggregate, updated afterwards. Optional
/// fields only overwrite the stored row when supplied, so a plain descriptor
/// leaves an existing partition key and snapshot flag untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamDescriptor {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub snapshot_threshold: Option<i32>,
    /// New physical partition key for the stream's events. May be changed
    /// while other connections are reading the stream.
    pub events_partition_key: Option<String>,
    /// Set `snapshot_outdated_at` on this commit, marking the stream as
    /// needing a fresh snapshot.
    pub mark_snapshot_outdated: bool,
}

impl StreamDescriptor {
    #[must_use]
    pub fn new(aggregate_id: Uuid, aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            snapshot_threshold: None,
            events_partition_key: None,
            mark_snapshot_outdated: false,
        }
    }

    #[must_use]
    pub fn with_snapshot_threshold(mut self, threshold: i32) -> Self {
        self.snapshot_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.events_partition_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn mark_snapshot_outdated(mut self) -> Self {
        self.mark_snapshot_outdated = true;
        self
    }
}

/// A loaded `stream_records` row.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRecord {
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub created_at: DateTime<Utc>,
    pub snapshot_threshold: Option<i32>,
    pub events_partition_key: String,
    pub snapshot_outdated_at: Option<DateTime<Utc>>,
}
