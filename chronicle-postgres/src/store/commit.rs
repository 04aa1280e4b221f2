use chronicle_core::{
    command::Command, config::Configuration, event::Event, stream::StreamDescriptor,
};
use sqlx::{Postgres, QueryBuilder};

use super::Store;
use crate::Error;

impl Store {
    /// Atomically persist a command and the events it produced.
    ///
    /// Writes one `command_records` row, upserts a `stream_records` row per
    /// descriptor (creating streams lazily on first commit), then bulk-inserts
    /// the events with `command_record_id` pointing at the just-written
    /// command. `xact_id` defaults to the inserting transaction's id.
    ///
    /// On success every committed event is pushed onto the current thread's
    /// publisher queue, in input order, and the queue is drained.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OptimisticLocking`] when any `(aggregate_id,
    /// sequence_number)` collides with an existing row; nothing is persisted
    /// in that case. Handler failures surface as [`Error::Publish`] *after*
    /// the database transaction has committed - compensating read-model
    /// rollback is the caller's concern.
    #[tracing::instrument(
        skip(self, command, streams),
        fields(command_type = %command.command_type, stream_count = streams.len())
    )]
    pub async fn commit_events(
        &self,
        command: &Command,
        streams: Vec<(StreamDescriptor, Vec<Event>)>,
    ) -> Result<(), Error> {
        let config = Configuration::current();

        let mut tx = self.pool().begin().await?;
        let command_record_id = Self::insert_command_record(&mut tx, command).await?;

        let mut committed = Vec::new();
        for (descriptor, events) in streams {
            Self::upsert_stream_record(&mut tx, &descriptor).await?;
            if !events.is_empty() {
                Self::insert_event_records(&mut tx, command_record_id, &events).await?;
            }
            committed.extend(events);
        }

        tx.commit().await?;
        tracing::debug!(
            command_record_id,
            event_count = committed.len(),
            "commit applied"
        );

        self.publisher().publish_events(committed, &config)?;
        Ok(())
    }

    async fn insert_command_record(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        command: &Command,
    ) -> Result<i32, Error> {
        sqlx::query_scalar(
            r"
            INSERT INTO command_records
                (user_id, aggregate_id, command_type, event_aggregate_id,
                 event_sequence_number, command_json, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(&command.user_id)
        .bind(command.aggregate_id)
        .bind(&command.command_type)
        .bind(command.event_aggregate_id)
        .bind(command.event_sequence_number)
        .bind(sqlx::types::Json(&command.payload))
        .bind(command.created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::from)
    }

    /// Create the stream on first commit; afterwards only the fields the
    /// descriptor supplies are overwritten. `aggregate_type` is immutable
    /// after creation.
    async fn upsert_stream_record(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        descriptor: &StreamDescriptor,
    ) -> Result<(), Error> {
        sqlx::query(
            r"
            INSERT INTO stream_records
                (aggregate_id, aggregate_type, created_at, snapshot_threshold,
                 events_partition_key, snapshot_outdated_at)
            VALUES ($1, $2, now(), $3, COALESCE($4, ''), CASE WHEN $5 THEN now() END)
            ON CONFLICT (aggregate_id) DO UPDATE
            SET snapshot_threshold   = COALESCE($3, stream_records.snapshot_threshold),
                events_partition_key = COALESCE($4, stream_records.events_partition_key),
                snapshot_outdated_at = CASE
                    WHEN $5 THEN now()
                    ELSE stream_records.snapshot_outdated_at
                END
            ",
        )
        .bind(descriptor.aggregate_id)
        .bind(&descriptor.aggregate_type)
        .bind(descriptor.snapshot_threshold)
        .bind(&descriptor.events_partition_key)
        .bind(descriptor.mark_snapshot_outdated)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_event_records(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        command_record_id: i32,
        events: &[Event],
    ) -> Result<(), Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO event_records
             (aggregate_id, sequence_number, created_at, event_type, event_json, command_record_id) ",
        );
        qb.push_values(events, |mut b, event| {
            b.push_bind(event.aggregate_id);
            b.push_bind(event.sequence_number);
            b.push_bind(event.created_at);
            b.push_bind(event.event_type().to_string());
            b.push_bind(sqlx::types::Json(event.json().clone()));
            b.push_bind(command_record_id);
        });

        qb.build()
            .execute(&mut **tx)
            .await
            .map_err(into_commit_error)?;
        Ok(())
    }
}

/// A unique violation on the event primary key means another writer claimed
/// one of the sequence slots; everything else propagates as a plain database
/// error.
fn into_commit_error(error: sqlx::Error) -> Error {
    let unique_violation =
        matches!(&error, sqlx::Error::Database(db) if db.is_unique_violation());
    if unique_violation {
        Error::OptimisticLocking(error)
    } else {
        Error::Database(error)
    }
}
