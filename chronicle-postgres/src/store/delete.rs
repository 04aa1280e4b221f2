use uuid::Uuid;

use super::Store;
use crate::Error;

impl Store {
    /// Remove a stream and everything attached to it.
    ///
    /// The delete trigger copies each removed event row into
    /// `saved_event_records` with operation `'D'`, preserving the audit
    /// trail. Command records are left in place; see
    /// [`permanently_delete_commands_without_events`].
    ///
    /// [`permanently_delete_commands_without_events`]:
    ///     Self::permanently_delete_commands_without_events
    #[tracing::instrument(skip(self), fields(aggregate_id = %aggregate_id))]
    pub async fn permanently_delete_event_stream(
        &self,
        aggregate_id: Uuid,
    ) -> Result<(), Error> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(r"DELETE FROM snapshot_records WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM event_records WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM stream_records WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove an aggregate's command records once their events are gone.
    ///
    /// A no-op while any event still references one of the commands; the
    /// foreign key from `event_records` enforces the same rule.
    pub async fn permanently_delete_commands_without_events(
        &self,
        aggregate_id: Uuid,
    ) -> Result<u64, Error> {
        let result = sqlx::query(
            r"
            DELETE FROM command_records
            WHERE aggregate_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM event_records
                  WHERE event_records.command_record_id = command_records.id
              )
            ",
        )
        .bind(aggregate_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
