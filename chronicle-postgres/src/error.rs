use chronicle_core::publisher::PublishEventError;
use uuid::Uuid;

/// Error type for `PostgreSQL` event store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Query execution or transaction failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Another writer claimed one of the `(aggregate_id, sequence_number)`
    /// slots in the batch. Reload the aggregate and retry the command.
    #[error("optimistic locking failure: {0}")]
    OptimisticLocking(#[source] sqlx::Error),
    /// A stream window contained no events to yield.
    #[error("no events for aggregate {0}")]
    NoEventsFound(Uuid),
    /// A stored `event_type` has no registered deserializer.
    #[error("unknown event type `{0}`")]
    UnknownEventType(String),
    /// A stored payload did not match the registered payload shape.
    #[error("deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),
    /// A handler failed while dispatching committed or replayed events.
    #[error(transparent)]
    Publish(#[from] PublishEventError),
}
