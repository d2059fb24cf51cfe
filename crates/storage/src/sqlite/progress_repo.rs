use sqlx::{Executor, Sqlite};
use vocab_core::model::{ItemId, LearnerId, ProgressRecord};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_progress_row};
use crate::repository::{ProgressRepository, StorageError};

/// Insert or replace one progress row through any executor (pool or transaction).
pub(super) async fn write_progress<'e, E>(
    executor: E,
    record: &ProgressRecord,
) -> Result<(), StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let study_time_ms = i64::try_from(record.study_time_ms())
        .map_err(|_| StorageError::Serialization("study_time_ms overflow".into()))?;

    sqlx::query(
        r"
        INSERT INTO progress (
            learner_id, item_id, exposure_count, quiz_attempts, quiz_correct,
            consecutive_correct, difficulty_score, mastery_stage, next_review_at,
            first_exposed_at, last_exposed_at, last_quiz_at, study_time_ms,
            created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(learner_id, item_id) DO UPDATE SET
            exposure_count = excluded.exposure_count,
            quiz_attempts = excluded.quiz_attempts,
            quiz_correct = excluded.quiz_correct,
            consecutive_correct = excluded.consecutive_correct,
            difficulty_score = excluded.difficulty_score,
            mastery_stage = excluded.mastery_stage,
            next_review_at = excluded.next_review_at,
            first_exposed_at = excluded.first_exposed_at,
            last_exposed_at = excluded.last_exposed_at,
            last_quiz_at = excluded.last_quiz_at,
            study_time_ms = excluded.study_time_ms,
            updated_at = excluded.updated_at
        ",
    )
    .bind(id_i64("learner_id", record.learner_id().value())?)
    .bind(id_i64("item_id", record.item_id().value())?)
    .bind(i64::from(record.exposure_count()))
    .bind(i64::from(record.quiz_attempts()))
    .bind(i64::from(record.quiz_correct()))
    .bind(i64::from(record.consecutive_correct()))
    .bind(record.difficulty_score())
    .bind(record.mastery_stage().as_str())
    .bind(record.next_review_at())
    .bind(record.first_exposed_at())
    .bind(record.last_exposed_at())
    .bind(record.last_quiz_at())
    .bind(study_time_ms)
    .bind(record.created_at())
    .bind(record.updated_at())
    .execute(executor)
    .await
    .map_err(conn)?;

    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        item_id: ItemId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                learner_id, item_id, exposure_count, quiz_attempts, quiz_correct,
                consecutive_correct, difficulty_score, mastery_stage, next_review_at,
                first_exposed_at, last_exposed_at, last_quiz_at, study_time_ms,
                created_at, updated_at
            FROM progress
            WHERE learner_id = ?1 AND item_id = ?2
            ",
        )
        .bind(id_i64("learner_id", learner_id.value())?)
        .bind(id_i64("item_id", item_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn put_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        write_progress(&self.pool, record).await
    }

    async fn progress_for_items(
        &self,
        learner_id: LearnerId,
        item_ids: &[ItemId],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT
                learner_id, item_id, exposure_count, quiz_attempts, quiz_correct,
                consecutive_correct, difficulty_score, mastery_stage, next_review_at,
                first_exposed_at, last_exposed_at, last_quiz_at, study_time_ms,
                created_at, updated_at
            FROM progress
            WHERE learner_id = ?1 AND item_id IN (
            ",
        );
        for i in 0..item_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\n ORDER BY item_id ASC");

        let mut q = sqlx::query(&sql).bind(id_i64("learner_id", learner_id.value())?);
        for id in item_ids {
            q = q.bind(id_i64("item_id", id.value())?);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;
        rows.iter().map(map_progress_row).collect()
    }
}
