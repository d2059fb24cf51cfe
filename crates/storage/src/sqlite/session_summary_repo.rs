use vocab_core::model::{CollectionId, LearnerId, SessionId, SessionSummary};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_summary_row};
use crate::repository::{SessionSummaryRepository, StorageError};

const SUMMARY_COLUMNS: &str = r"
    session_id, learner_id, collection_id, direction, started_at, closed_at,
    duration_secs, close_reason, items_served, correct_count, exposures,
    quiz_attempts, unique_items, items_presented, batches_served,
    quiz_response_ms_total, quiz_response_samples
";

#[async_trait::async_trait]
impl SessionSummaryRepository for SqliteRepository {
    async fn append_summary(&self, summary: &SessionSummary) -> Result<(), StorageError> {
        let tally = summary.tally();
        let response_total = i64::try_from(tally.quiz_response_ms_total)
            .map_err(|_| StorageError::Serialization("quiz_response_ms_total overflow".into()))?;

        let res = sqlx::query(
            r"
                INSERT INTO session_summaries (
                    session_id, learner_id, collection_id, direction, started_at, closed_at,
                    duration_secs, close_reason, items_served, correct_count, exposures,
                    quiz_attempts, unique_items, items_presented, batches_served,
                    quiz_response_ms_total, quiz_response_samples
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                ON CONFLICT(session_id) DO NOTHING
            ",
        )
        .bind(summary.session_id().to_string())
        .bind(id_i64("learner_id", summary.learner_id().value())?)
        .bind(id_i64("collection_id", summary.collection_id().value())?)
        .bind(summary.direction().as_str())
        .bind(summary.started_at())
        .bind(summary.closed_at())
        .bind(summary.duration_secs())
        .bind(summary.close_reason().as_str())
        .bind(i64::from(tally.items_served))
        .bind(i64::from(tally.correct_count))
        .bind(i64::from(tally.exposures))
        .bind(i64::from(tally.quiz_attempts))
        .bind(i64::from(tally.unique_items))
        .bind(i64::from(tally.items_presented))
        .bind(i64::from(tally.batches_served))
        .bind(response_total)
        .bind(i64::from(tally.quiz_response_samples))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            let existing = self.get_summary(summary.session_id()).await?;
            if &existing != summary {
                return Err(StorageError::Conflict);
            }
        }

        Ok(())
    }

    async fn get_summary(&self, session_id: SessionId) -> Result<SessionSummary, StorageError> {
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM session_summaries WHERE session_id = ?1");
        let row = sqlx::query(&sql)
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_summary_row(&row)
    }

    async fn list_summaries(
        &self,
        learner_id: LearnerId,
        collection_id: Option<CollectionId>,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let mut sql = format!("SELECT {SUMMARY_COLUMNS} FROM session_summaries WHERE learner_id = ?1");
        let mut bind_index = 2;
        if collection_id.is_some() {
            sql.push_str(" AND collection_id = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        sql.push_str(" ORDER BY closed_at DESC, session_id DESC");
        sql.push_str(" LIMIT ?");
        sql.push_str(&bind_index.to_string());

        let mut query = sqlx::query(&sql).bind(id_i64("learner_id", learner_id.value())?);
        if let Some(collection) = collection_id {
            query = query.bind(id_i64("collection_id", collection.value())?);
        }
        query = query.bind(i64::from(limit));

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;
        rows.iter().map(map_summary_row).collect()
    }
}
