use sqlx::{Executor, Sqlite};
use vocab_core::model::{InteractionRecord, ProgressRecord, SessionId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_interaction_row};
use super::progress_repo::write_progress;
use crate::repository::{
    InteractionLogRepository, InteractionPersistence, StorageError,
};

async fn write_interaction<'e, E>(
    executor: E,
    record: &InteractionRecord,
) -> Result<i64, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        r"
        INSERT INTO interactions (
            session_id, learner_id, item_id, direction, kind,
            correct, response_time_ms, occurred_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
    )
    .bind(record.session_id.to_string())
    .bind(id_i64("learner_id", record.learner_id.value())?)
    .bind(id_i64("item_id", record.item_id.value())?)
    .bind(record.direction.as_str())
    .bind(record.interaction.kind.as_str())
    .bind(record.interaction.correct)
    .bind(record.interaction.response_time_ms)
    .bind(record.occurred_at)
    .execute(executor)
    .await
    .map_err(conn)?;

    Ok(res.last_insert_rowid())
}

#[async_trait::async_trait]
impl InteractionLogRepository for SqliteRepository {
    async fn interactions_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<InteractionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, session_id, learner_id, item_id, direction, kind,
                correct, response_time_ms, occurred_at
            FROM interactions
            WHERE session_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_interaction_row).collect()
    }
}

#[async_trait::async_trait]
impl InteractionPersistence for SqliteRepository {
    async fn apply_interaction(
        &self,
        progress: &ProgressRecord,
        log: InteractionRecord,
    ) -> Result<i64, StorageError> {
        if log.learner_id != progress.learner_id() || log.item_id != progress.item_id() {
            return Err(StorageError::Conflict);
        }

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Log first, then progress; both land or neither does.
        let id = write_interaction(&mut *tx, &log).await?;
        write_progress(&mut *tx, progress).await?;

        tx.commit().await.map_err(conn)?;

        Ok(id)
    }
}
