use std::pin::Pin;

use chrono::{DateTime, Utc};
use chronicle_core::{config::Configuration, event::Event, publisher::PublishEventError};
use futures_core::Stream;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use super::Store;
use crate::Error;

/// The boxed row stream consumed by
/// [`replay_events_from_cursor`](Store::replay_events_from_cursor).
pub type ReplayStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ReplayRow, sqlx::Error>> + Send + 'a>>;

/// A raw event row as scanned by the replay cursor.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct ReplayRow {
    pub aggregate_id: Uuid,
    pub sequence_number: i32,
    pub created_at: DateTime<Utc>,
    pub event_type: String,
    pub event_json: serde_json::Value,
    pub xact_id: i64,
}

impl Store {
    /// Build the standard replay row stream, ordered by
    /// `(aggregate_id, sequence_number)`.
    ///
    /// Pass the `last_aggregate_id` from a progress checkpoint as
    /// `resume_after` to restart an interrupted scan; aggregates up to and
    /// including it are skipped.
    #[must_use]
    pub fn replay_cursor(&self, resume_after: Option<Uuid>) -> ReplayStream<'_> {
        const ALL: &str = "SELECT aggregate_id, sequence_number, created_at, event_type, \
                           event_json, COALESCE(xact_id, 0) AS xact_id FROM event_records \
                           ORDER BY aggregate_id, sequence_number";
        const RESUMED: &str = "SELECT aggregate_id, sequence_number, created_at, event_type, \
                               event_json, COALESCE(xact_id, 0) AS xact_id FROM event_records \
                               WHERE aggregate_id > $1 ORDER BY aggregate_id, sequence_number";

        match resume_after {
            None => sqlx::query_as::<_, ReplayRow>(ALL).fetch(self.pool()),
            Some(last) => sqlx::query_as::<_, ReplayRow>(RESUMED)
                .bind(last)
                .fetch(self.pool()),
        }
    }

    /// Replay persisted events through all configured handlers.
    ///
    /// The scan is chunked into blocks of `block_size`; each block is
    /// deserialized through the event type registry and dispatched to every
    /// configured handler directly - replay is not a transactional commit, so
    /// the publisher queue is bypassed. `on_progress(cumulative, last_xact_id,
    /// last_aggregate_id)` fires once per block; the reported ids are the
    /// natural checkpoint for restarting via
    /// [`replay_cursor`](Self::replay_cursor).
    ///
    /// Returns the total number of events replayed.
    ///
    /// # Errors
    ///
    /// Fails on the first row error, unresolvable event type, payload
    /// mismatch, or handler failure (wrapped as [`Error::Publish`]).
    #[tracing::instrument(skip(self, get_events, on_progress))]
    pub async fn replay_events_from_cursor<F>(
        &self,
        mut get_events: ReplayStream<'_>,
        block_size: usize,
        mut on_progress: F,
    ) -> Result<u64, Error>
    where
        F: FnMut(u64, i64, Uuid),
    {
        let config = Configuration::current();
        let block_size = block_size.max(1);

        let mut block = Vec::with_capacity(block_size);
        let mut total = 0_u64;
        while let Some(row) = get_events.next().await {
            block.push(row?);
            if block.len() == block_size {
                total = self.dispatch_block(&config, &mut block, total, &mut on_progress)?;
            }
        }
        if !block.is_empty() {
            total = self.dispatch_block(&config, &mut block, total, &mut on_progress)?;
        }

        tracing::debug!(total, "replay finished");
        Ok(total)
    }

    fn dispatch_block<F>(
        &self,
        config: &Configuration,
        block: &mut Vec<ReplayRow>,
        mut total: u64,
        on_progress: &mut F,
    ) -> Result<u64, Error>
    where
        F: FnMut(u64, i64, Uuid),
    {
        let (last_xact_id, last_aggregate_id) = block
            .last()
            .map(|row| (row.xact_id, row.aggregate_id))
            .unwrap_or_default();

        for row in block.drain(..) {
            let entry = self.resolve_event_type(config, &row.event_type)?;
            let payload = entry
                .deserialize(&row.event_json)
                .map_err(Error::Deserialization)?;
            let event = Event::from_stored(
                row.aggregate_id,
                row.sequence_number,
                row.created_at,
                row.event_type,
                row.event_json,
                payload,
            );

            for handler in &config.event_handlers {
                handler.handle_message(&event).map_err(|source| {
                    Error::Publish(PublishEventError {
                        event_handler: handler.name().to_string(),
                        event: event.clone(),
                        source,
                    })
                })?;
            }
            total += 1;
        }

        on_progress(total, last_xact_id, last_aggregate_id);
        Ok(total)
    }
}
