//! The command record persisted alongside its events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::event::truncate_to_micros;

/// A command descriptor, stored in the same transaction as the events it
/// produced.
///
/// `event_aggregate_id` / `event_sequence_number` back-reference the event a
/// workflow was reacting to when it issued this command.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub user_id: Option<String>,
    pub aggregate_id: Option<Uuid>,
    pub command_type: String,
    pub event_aggregate_id: Option<Uuid>,
    pub event_sequence_number: Option<i32>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Command {
    /// Build a command from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the payload fails to serialize.
    pub fn new<T: Serialize>(
        command_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            user_id: None,
            aggregate_id: None,
            command_type: command_type.into(),
            event_aggregate_id: None,
            event_sequence_number: None,
            payload: serde_json::to_value(payload)?,
            created_at: truncate_to_micros(Utc::now()),
        })
    }

    #[must_use]
    pub fn for_aggregate(mut self, aggregate_id: Uuid) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    #[must_use]
    pub fn by_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Record the event this command was issued in reaction to.
    #[must_use]
    pub fn caused_by_event(mut self, aggregate_id: Uuid, sequence_number: i32) -> Self {
        self.event_aggregate_id = Some(aggregate_id);
        self.event_sequence_number = Some(sequence_number);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize)]
    struct OpenAccount {
        owner: String,
    }

    #[test]
    fn new_serializes_payload_to_json_object() {
        let command = Command::new(
            "open-account",
            &OpenAccount {
                owner: "Alice".to_string(),
            },
        )
        .unwrap();

        assert_eq!(command.command_type, "open-account");
        assert!(command.payload.is_object());
        assert_eq!(command.payload["owner"], "Alice");
        assert!(command.user_id.is_none());
    }

    #[test]
    fn builders_attach_identity_and_causation() {
        let aggregate_id = Uuid::new_v4();
        let source_id = Uuid::new_v4();

        let command = Command::new("close-account", &serde_json::json!({}))
            .unwrap()
            .for_aggregate(aggregate_id)
            .by_user("user-1")
            .caused_by_event(source_id, 4);

        assert_eq!(command.aggregate_id, Some(aggregate_id));
        assert_eq!(command.user_id.as_deref(), Some("user-1"));
        assert_eq!(command.event_aggregate_id, Some(source_id));
        assert_eq!(command.event_sequence_number, Some(4));
    }
}
