use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates collections, items, per-learner progress, the interaction log,
/// session summaries, and their indexes.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS collections (
                    id INTEGER PRIMARY KEY,
                    owner_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS items (
                    id INTEGER PRIMARY KEY,
                    collection_id INTEGER NOT NULL,
                    prompt TEXT NOT NULL,
                    aid TEXT NOT NULL,
                    translation TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress (
                    learner_id INTEGER NOT NULL,
                    item_id INTEGER NOT NULL,
                    exposure_count INTEGER NOT NULL CHECK (exposure_count >= 0),
                    quiz_attempts INTEGER NOT NULL CHECK (quiz_attempts >= 0),
                    quiz_correct INTEGER NOT NULL CHECK (quiz_correct BETWEEN 0 AND quiz_attempts),
                    consecutive_correct INTEGER NOT NULL CHECK (consecutive_correct >= 0),
                    difficulty_score REAL NOT NULL CHECK (difficulty_score BETWEEN 0.1 AND 5.0),
                    mastery_stage TEXT NOT NULL
                        CHECK (mastery_stage IN ('new', 'learning', 'review', 'mastered')),
                    next_review_at TEXT NOT NULL,
                    first_exposed_at TEXT,
                    last_exposed_at TEXT,
                    last_quiz_at TEXT,
                    study_time_ms INTEGER NOT NULL CHECK (study_time_ms >= 0),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (learner_id, item_id),
                    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS interactions (
                    id INTEGER PRIMARY KEY,
                    session_id TEXT NOT NULL,
                    learner_id INTEGER NOT NULL,
                    item_id INTEGER NOT NULL,
                    direction TEXT NOT NULL,
                    kind TEXT NOT NULL CHECK (kind IN ('exposure', 'quiz')),
                    correct INTEGER,
                    response_time_ms INTEGER,
                    occurred_at TEXT NOT NULL,
                    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_summaries (
                    session_id TEXT PRIMARY KEY,
                    learner_id INTEGER NOT NULL,
                    collection_id INTEGER NOT NULL,
                    direction TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    closed_at TEXT NOT NULL,
                    duration_secs INTEGER NOT NULL CHECK (duration_secs >= 0),
                    close_reason TEXT NOT NULL,
                    items_served INTEGER NOT NULL CHECK (items_served >= 0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    exposures INTEGER NOT NULL CHECK (exposures >= 0),
                    quiz_attempts INTEGER NOT NULL CHECK (quiz_attempts >= 0),
                    unique_items INTEGER NOT NULL CHECK (unique_items >= 0),
                    items_presented INTEGER NOT NULL CHECK (items_presented >= 0),
                    batches_served INTEGER NOT NULL CHECK (batches_served >= 0),
                    quiz_response_ms_total INTEGER NOT NULL CHECK (quiz_response_ms_total >= 0),
                    quiz_response_samples INTEGER NOT NULL CHECK (quiz_response_samples >= 0),
                    FOREIGN KEY (collection_id) REFERENCES collections(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_items_collection
                    ON items(collection_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_progress_learner_next_review
                    ON progress(learner_id, next_review_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_interactions_session
                    ON interactions(session_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_session_summaries_learner_closed
                    ON session_summaries(learner_id, closed_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
