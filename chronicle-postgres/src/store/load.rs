use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chronicle_core::{config::Configuration, event::Event, stream::StreamRecord};
use sqlx::{Postgres, QueryBuilder, Row, postgres::PgRow};
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use super::{SNAPSHOT_EVENT_TYPE, Store};
use crate::Error;

impl Store {
    /// Load a stream and its events after the latest snapshot.
    ///
    /// Returns `Ok(None)` for unknown aggregates. The stream row and the
    /// event rows are read inside one transaction, so a concurrent change to
    /// the stream's `events_partition_key` can never produce an empty load:
    /// the reader either sees the old key with all events in the old
    /// partition, or the new key with all events in the new one.
    #[tracing::instrument(skip(self), fields(aggregate_id = %aggregate_id))]
    pub async fn load_events(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<(StreamRecord, Vec<Event>)>, Error> {
        let config = Configuration::current();

        let mut tx = self.pool().begin().await?;
        let Some(stream) = Self::fetch_stream(&mut tx, aggregate_id).await? else {
            return Ok(None);
        };

        let snapshot_sequence: i32 = sqlx::query_scalar(
            r"SELECT COALESCE(MAX(sequence_number), 0) FROM snapshot_records WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await?;

        let rows = sqlx::query(
            r"
            SELECT aggregate_id, sequence_number, created_at, event_type, event_json
            FROM event_records
            WHERE aggregate_id = $1 AND sequence_number > $2
            ORDER BY sequence_number ASC
            ",
        )
        .bind(aggregate_id)
        .bind(snapshot_sequence)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(self.decode_event_row(&config, row)?);
        }
        Ok(Some((stream, events)))
    }

    /// Batched form of [`load_events`](Self::load_events).
    ///
    /// Unknown ids are skipped; results come back in the caller's id order.
    #[tracing::instrument(skip(self, aggregate_ids), fields(aggregate_count = aggregate_ids.len()))]
    pub async fn load_events_for_aggregates(
        &self,
        aggregate_ids: &[Uuid],
    ) -> Result<Vec<(StreamRecord, Vec<Event>)>, Error> {
        if aggregate_ids.is_empty() {
            return Ok(Vec::new());
        }
        let config = Configuration::current();

        let mut tx = self.pool().begin().await?;
        let stream_rows = sqlx::query(
            r"
            SELECT aggregate_id, aggregate_type, created_at, snapshot_threshold,
                   events_partition_key, snapshot_outdated_at
            FROM stream_records
            WHERE aggregate_id = ANY($1)
            ",
        )
        .bind(aggregate_ids)
        .fetch_all(&mut *tx)
        .await?;

        let event_rows = sqlx::query(
            r"
            SELECT e.aggregate_id, e.sequence_number, e.created_at, e.event_type, e.event_json
            FROM event_records e
            LEFT JOIN (
                SELECT aggregate_id, MAX(sequence_number) AS sequence_number
                FROM snapshot_records
                WHERE aggregate_id = ANY($1)
                GROUP BY aggregate_id
            ) s ON s.aggregate_id = e.aggregate_id
            WHERE e.aggregate_id = ANY($1)
              AND e.sequence_number > COALESCE(s.sequence_number, 0)
            ORDER BY e.aggregate_id, e.sequence_number
            ",
        )
        .bind(aggregate_ids)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut streams: HashMap<Uuid, StreamRecord> = HashMap::with_capacity(stream_rows.len());
        for row in &stream_rows {
            let stream = Self::decode_stream_row(row)?;
            streams.insert(stream.aggregate_id, stream);
        }

        let mut events_by_aggregate: HashMap<Uuid, Vec<Event>> = HashMap::new();
        for row in &event_rows {
            let event = self.decode_event_row(&config, row)?;
            events_by_aggregate
                .entry(event.aggregate_id)
                .or_default()
                .push(event);
        }

        let mut out = Vec::with_capacity(streams.len());
        for aggregate_id in aggregate_ids {
            if let Some(stream) = streams.remove(aggregate_id) {
                let events = events_by_aggregate.remove(aggregate_id).unwrap_or_default();
                out.push((stream, events));
            }
        }
        Ok(out)
    }

    /// Fetch a single event by its stream coordinates.
    ///
    /// # Errors
    ///
    /// Returns a store error when the query or payload resolution fails.
    pub async fn load_event(
        &self,
        aggregate_id: Uuid,
        sequence_number: i32,
    ) -> Result<Option<Event>, Error> {
        let config = Configuration::current();
        let row = sqlx::query(
            r"
            SELECT aggregate_id, sequence_number, created_at, event_type, event_json
            FROM event_records
            WHERE aggregate_id = $1 AND sequence_number = $2
            ",
        )
        .bind(aggregate_id)
        .bind(sequence_number)
        .fetch_optional(self.pool())
        .await?;

        row.map(|row| self.decode_event_row(&config, &row)).transpose()
    }

    /// Stream a single aggregate's events through `f` in ascending sequence
    /// order.
    ///
    /// Legacy snapshot marker rows are skipped. When `load_until` is given,
    /// only events with `created_at` strictly before it are yielded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEventsFound`] when the aggregate is unknown or the
    /// window yields nothing.
    pub async fn stream_events_for_aggregate<F>(
        &self,
        aggregate_id: Uuid,
        load_until: Option<DateTime<Utc>>,
        mut f: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&StreamRecord, Event) -> Result<(), Error>,
    {
        let config = Configuration::current();

        let mut tx = self.pool().begin().await?;
        let Some(stream) = Self::fetch_stream(&mut tx, aggregate_id).await? else {
            return Err(Error::NoEventsFound(aggregate_id));
        };

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT aggregate_id, sequence_number, created_at, event_type, event_json \
             FROM event_records WHERE aggregate_id = ",
        );
        qb.push_bind(aggregate_id);
        qb.push(" AND event_type <> ").push_bind(SNAPSHOT_EVENT_TYPE);
        if let Some(until) = load_until {
            qb.push(" AND created_at < ").push_bind(until);
        }
        qb.push(" ORDER BY sequence_number ASC");

        let mut yielded = false;
        {
            let mut rows = qb.build().fetch(&mut *tx);
            while let Some(row) = rows.next().await {
                let event = self.decode_event_row(&config, &row?)?;
                yielded = true;
                f(&stream, event)?;
            }
        }
        tx.commit().await?;

        if yielded {
            Ok(())
        } else {
            Err(Error::NoEventsFound(aggregate_id))
        }
    }

    /// Whether any event rows exist for the aggregate.
    pub async fn events_exist(&self, aggregate_id: Uuid) -> Result<bool, Error> {
        let exists = sqlx::query_scalar(
            r"SELECT EXISTS (SELECT 1 FROM event_records WHERE aggregate_id = $1)",
        )
        .bind(aggregate_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Whether a stream row exists for the aggregate.
    pub async fn stream_exists(&self, aggregate_id: Uuid) -> Result<bool, Error> {
        let exists = sqlx::query_scalar(
            r"SELECT EXISTS (SELECT 1 FROM stream_records WHERE aggregate_id = $1)",
        )
        .bind(aggregate_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    pub(in crate::store) async fn fetch_stream(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<Option<StreamRecord>, Error> {
        let row = sqlx::query(
            r"
            SELECT aggregate_id, aggregate_type, created_at, snapshot_threshold,
                   events_partition_key, snapshot_outdated_at
            FROM stream_records
            WHERE aggregate_id = $1
            ",
        )
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(|row| Self::decode_stream_row(&row))
            .transpose()
            .map_err(Error::from)
    }

    pub(in crate::store) fn decode_stream_row(row: &PgRow) -> Result<StreamRecord, sqlx::Error> {
        Ok(StreamRecord {
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            created_at: row.try_get("created_at")?,
            snapshot_threshold: row.try_get("snapshot_threshold")?,
            events_partition_key: row.try_get("events_partition_key")?,
            snapshot_outdated_at: row.try_get("snapshot_outdated_at")?,
        })
    }

    /// Deserialize a raw event row, resolving its payload type through the
    /// registry.
    pub(in crate::store) fn decode_event_row(
        &self,
        config: &Configuration,
        row: &PgRow,
    ) -> Result<Event, Error> {
        let aggregate_id: Uuid = row.try_get("aggregate_id")?;
        let sequence_number: i32 = row.try_get("sequence_number")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let event_type: String = row.try_get("event_type")?;
        let json: serde_json::Value = row.try_get("event_json")?;

        let entry = self.resolve_event_type(config, &event_type)?;
        let payload = entry.deserialize(&json).map_err(Error::Deserialization)?;
        Ok(Event::from_stored(
            aggregate_id,
            sequence_number,
            created_at,
            event_type,
            json,
            payload,
        ))
    }
}
