use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use vocab_core::model::{
    CloseReason, Collection, CollectionId, Direction, Interaction, InteractionKind,
    InteractionRecord, Item, ItemId, LearnerId, MasteryStage, ProgressRecord, SessionId,
    SessionSummary, SessionTally,
};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn get_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn collection_id_from_i64(v: i64) -> Result<CollectionId, StorageError> {
    Ok(CollectionId::new(i64_to_u64("collection_id", v)?))
}

pub(crate) fn item_id_from_i64(v: i64) -> Result<ItemId, StorageError> {
    Ok(ItemId::new(i64_to_u64("item_id", v)?))
}

pub(crate) fn learner_id_from_i64(v: i64) -> Result<LearnerId, StorageError> {
    Ok(LearnerId::new(i64_to_u64("learner_id", v)?))
}

fn session_id_from_row(row: &SqliteRow) -> Result<SessionId, StorageError> {
    let raw: String = row.try_get("session_id").map_err(ser)?;
    SessionId::from_str(&raw).map_err(ser)
}

pub(crate) fn map_collection_row(row: &SqliteRow) -> Result<Collection, StorageError> {
    Collection::new(
        collection_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        learner_id_from_i64(row.try_get::<i64, _>("owner_id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_item_row(row: &SqliteRow) -> Result<Item, StorageError> {
    Item::from_persisted(
        item_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        collection_id_from_i64(row.try_get::<i64, _>("collection_id").map_err(ser)?)?,
        row.try_get("prompt").map_err(ser)?,
        row.try_get("aid").map_err(ser)?,
        row.try_get("translation").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let stage: String = row.try_get("mastery_stage").map_err(ser)?;
    let study_time_ms = i64_to_u64(
        "study_time_ms",
        row.try_get::<i64, _>("study_time_ms").map_err(ser)?,
    )?;

    ProgressRecord::from_persisted(
        learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
        item_id_from_i64(row.try_get::<i64, _>("item_id").map_err(ser)?)?,
        get_u32(row, "exposure_count")?,
        get_u32(row, "quiz_attempts")?,
        get_u32(row, "quiz_correct")?,
        get_u32(row, "consecutive_correct")?,
        row.try_get("difficulty_score").map_err(ser)?,
        MasteryStage::parse(&stage).map_err(ser)?,
        row.try_get("next_review_at").map_err(ser)?,
        row.try_get("first_exposed_at").map_err(ser)?,
        row.try_get("last_exposed_at").map_err(ser)?,
        row.try_get("last_quiz_at").map_err(ser)?,
        study_time_ms,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_interaction_row(row: &SqliteRow) -> Result<InteractionRecord, StorageError> {
    let direction: String = row.try_get("direction").map_err(ser)?;
    let kind: String = row.try_get("kind").map_err(ser)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(ser)?;

    let interaction = Interaction {
        kind: InteractionKind::parse(&kind).map_err(ser)?,
        correct: row.try_get("correct").map_err(ser)?,
        response_time_ms: row.try_get("response_time_ms").map_err(ser)?,
    };

    Ok(InteractionRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        session_id: session_id_from_row(row)?,
        learner_id: learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
        item_id: item_id_from_i64(row.try_get::<i64, _>("item_id").map_err(ser)?)?,
        direction: Direction::parse(&direction).map_err(ser)?,
        interaction,
        occurred_at,
    })
}

pub(crate) fn map_summary_row(row: &SqliteRow) -> Result<SessionSummary, StorageError> {
    let direction: String = row.try_get("direction").map_err(ser)?;
    let close_reason: String = row.try_get("close_reason").map_err(ser)?;
    let tally = SessionTally {
        items_served: get_u32(row, "items_served")?,
        correct_count: get_u32(row, "correct_count")?,
        exposures: get_u32(row, "exposures")?,
        quiz_attempts: get_u32(row, "quiz_attempts")?,
        unique_items: get_u32(row, "unique_items")?,
        items_presented: get_u32(row, "items_presented")?,
        batches_served: get_u32(row, "batches_served")?,
        quiz_response_ms_total: i64_to_u64(
            "quiz_response_ms_total",
            row.try_get::<i64, _>("quiz_response_ms_total").map_err(ser)?,
        )?,
        quiz_response_samples: get_u32(row, "quiz_response_samples")?,
    };

    SessionSummary::from_persisted(
        session_id_from_row(row)?,
        learner_id_from_i64(row.try_get::<i64, _>("learner_id").map_err(ser)?)?,
        collection_id_from_i64(row.try_get::<i64, _>("collection_id").map_err(ser)?)?,
        Direction::parse(&direction).map_err(ser)?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("closed_at").map_err(ser)?,
        row.try_get("duration_secs").map_err(ser)?,
        CloseReason::parse(&close_reason).map_err(ser)?,
        tally,
    )
    .map_err(ser)
}
