use chrono::{DateTime, Utc};
use chronicle_core::snapshot::Snapshot;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::Store;
use crate::Error;

impl Store {
    /// Insert snapshots and clear `snapshot_outdated_at` for each affected
    /// stream.
    #[tracing::instrument(skip(self, snapshots), fields(snapshot_count = snapshots.len()))]
    pub async fn store_snapshots(&self, snapshots: &[Snapshot]) -> Result<(), Error> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO snapshot_records
             (aggregate_id, sequence_number, created_at, snapshot_type, snapshot_json) ",
        );
        qb.push_values(snapshots, |mut b, snapshot| {
            b.push_bind(snapshot.aggregate_id);
            b.push_bind(snapshot.sequence_number);
            b.push_bind(snapshot.created_at);
            b.push_bind(snapshot.snapshot_type.clone());
            b.push_bind(sqlx::types::Json(snapshot.payload.clone()));
        });
        qb.build().execute(&mut *tx).await?;

        let aggregate_ids: Vec<Uuid> = snapshots.iter().map(|s| s.aggregate_id).collect();
        sqlx::query(
            r"UPDATE stream_records SET snapshot_outdated_at = NULL WHERE aggregate_id = ANY($1)",
        )
        .bind(&aggregate_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The most recent snapshot for an aggregate, if any.
    pub async fn load_latest_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<Snapshot>, Error> {
        let row = sqlx::query(
            r"
            SELECT aggregate_id, sequence_number, created_at, snapshot_type, snapshot_json
            FROM snapshot_records
            WHERE aggregate_id = $1
            ORDER BY sequence_number DESC
            LIMIT 1
            ",
        )
        .bind(aggregate_id)
        .fetch_optional(self.pool())
        .await?;

        let snapshot = row
            .map(|row| -> Result<Snapshot, sqlx::Error> {
                Ok(Snapshot {
                    aggregate_id: row.try_get("aggregate_id")?,
                    sequence_number: row.try_get("sequence_number")?,
                    created_at: row.try_get("created_at")?,
                    snapshot_type: row.try_get("snapshot_type")?,
                    payload: row.try_get("snapshot_json")?,
                })
            })
            .transpose()?;
        Ok(snapshot)
    }

    /// Flag an aggregate as needing a fresh snapshot.
    pub async fn mark_aggregate_for_snapshotting(&self, aggregate_id: Uuid) -> Result<(), Error> {
        sqlx::query(
            r"UPDATE stream_records SET snapshot_outdated_at = now() WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Take an aggregate out of the snapshotting rotation: its snapshots are
    /// deleted and the outdated flag cleared.
    #[tracing::instrument(skip(self), fields(aggregate_id = %aggregate_id))]
    pub async fn clear_aggregate_for_snapshotting(
        &self,
        aggregate_id: Uuid,
    ) -> Result<(), Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(r"DELETE FROM snapshot_records WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r"UPDATE stream_records SET snapshot_outdated_at = NULL WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Stop snapshotting aggregates whose last event is older than
    /// `last_event_before`. Existing snapshots are kept.
    pub async fn clear_aggregates_for_snapshotting_with_last_event_before(
        &self,
        last_event_before: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r"
            UPDATE stream_records SET snapshot_outdated_at = NULL
            WHERE snapshot_outdated_at IS NOT NULL
              AND aggregate_id IN (
                  SELECT aggregate_id FROM event_records
                  GROUP BY aggregate_id
                  HAVING MAX(created_at) < $1
              )
            ",
        )
        .bind(last_event_before)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Aggregates with a pending snapshot flag, in id order, strictly after
    /// `last_aggregate_id`. Intended for paginated snapshotter sweeps.
    pub async fn aggregates_that_need_snapshots(
        &self,
        last_aggregate_id: Option<Uuid>,
        limit: Option<i64>,
    ) -> Result<Vec<Uuid>, Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT aggregate_id FROM stream_records WHERE snapshot_outdated_at IS NOT NULL",
        );
        if let Some(last) = last_aggregate_id {
            qb.push(" AND aggregate_id > ").push_bind(last);
        }
        qb.push(" ORDER BY aggregate_id ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let ids = qb.build_query_scalar().fetch_all(self.pool()).await?;
        Ok(ids)
    }

    /// Same filter as [`aggregates_that_need_snapshots`], ordered by the
    /// oldest outdated flag first.
    ///
    /// [`aggregates_that_need_snapshots`]: Self::aggregates_that_need_snapshots
    pub async fn aggregates_that_need_snapshots_ordered_by_priority(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<Uuid>, Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT aggregate_id FROM stream_records WHERE snapshot_outdated_at IS NOT NULL \
             ORDER BY snapshot_outdated_at ASC",
        );
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let ids = qb.build_query_scalar().fetch_all(self.pool()).await?;
        Ok(ids)
    }

    /// Delete an aggregate's snapshots strictly below `sequence_number`.
    ///
    /// If that removes the last snapshot while the aggregate still has
    /// events, the aggregate re-enters the needs-snapshot set.
    pub async fn delete_snapshots_before(
        &self,
        aggregate_id: Uuid,
        sequence_number: i32,
    ) -> Result<(), Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r"DELETE FROM snapshot_records WHERE aggregate_id = $1 AND sequence_number < $2",
        )
        .bind(aggregate_id)
        .bind(sequence_number)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE stream_records SET snapshot_outdated_at = now()
            WHERE aggregate_id = $1
              AND NOT EXISTS (SELECT 1 FROM snapshot_records WHERE aggregate_id = $1)
              AND EXISTS (SELECT 1 FROM event_records WHERE aggregate_id = $1)
            ",
        )
        .bind(aggregate_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove every snapshot and re-mark every aggregate that still has
    /// events as needing one.
    #[tracing::instrument(skip(self))]
    pub async fn delete_all_snapshots(&self) -> Result<(), Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(r"DELETE FROM snapshot_records").execute(&mut *tx).await?;
        sqlx::query(
            r"
            UPDATE stream_records SET snapshot_outdated_at = now()
            WHERE EXISTS (
                SELECT 1 FROM event_records
                WHERE event_records.aggregate_id = stream_records.aggregate_id
            )
            ",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
