use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{ItemId, LearnerId};

/// Difficulty assigned to an item the learner has never seen.
pub const INITIAL_DIFFICULTY: f64 = 1.0;

/// Every stored difficulty lies in `[MIN_DIFFICULTY, MAX_DIFFICULTY]`.
pub const MIN_DIFFICULTY: f64 = 0.1;
pub const MAX_DIFFICULTY: f64 = 5.0;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("difficulty score must be within [0.1, 5.0], got {0}")]
    InvalidDifficulty(f64),

    #[error("quiz_correct ({correct}) exceeds quiz_attempts ({attempts})")]
    CorrectExceedsAttempts { correct: u32, attempts: u32 },

    #[error("consecutive_correct ({streak}) exceeds quiz_correct ({correct})")]
    StreakExceedsCorrect { streak: u32, correct: u32 },

    #[error("invalid mastery stage: {0}")]
    InvalidStage(String),
}

//
// ─── MASTERY STAGE ─────────────────────────────────────────────────────────────
//

/// How well a learner currently knows an item.
///
/// Derived from lifetime quiz accuracy and volume on every quiz answer, so an
/// item can fall back to an earlier stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryStage {
    New,
    Learning,
    Review,
    Mastered,
}

impl MasteryStage {
    pub const ALL: [MasteryStage; 4] = [
        MasteryStage::New,
        MasteryStage::Learning,
        MasteryStage::Review,
        MasteryStage::Mastered,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MasteryStage::New => "new",
            MasteryStage::Learning => "learning",
            MasteryStage::Review => "review",
            MasteryStage::Mastered => "mastered",
        }
    }

    /// Parses the storage representation produced by [`MasteryStage::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidStage` for unknown values.
    pub fn parse(value: &str) -> Result<Self, ProgressError> {
        match value {
            "new" => Ok(MasteryStage::New),
            "learning" => Ok(MasteryStage::Learning),
            "review" => Ok(MasteryStage::Review),
            "mastered" => Ok(MasteryStage::Mastered),
            other => Err(ProgressError::InvalidStage(other.to_owned())),
        }
    }
}

impl fmt::Display for MasteryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Per-learner, per-item study state.
///
/// Mutated only by the evaluator and scheduler in this crate; everything else
/// reads it through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    learner_id: LearnerId,
    item_id: ItemId,
    exposure_count: u32,
    quiz_attempts: u32,
    quiz_correct: u32,
    consecutive_correct: u32,
    difficulty_score: f64,
    mastery_stage: MasteryStage,
    next_review_at: DateTime<Utc>,
    first_exposed_at: Option<DateTime<Utc>>,
    last_exposed_at: Option<DateTime<Utc>>,
    last_quiz_at: Option<DateTime<Utc>>,
    study_time_ms: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// The record assumed for a pair with no stored progress: stage New,
    /// difficulty 1.0, eligible immediately.
    #[must_use]
    pub fn unseen(learner_id: LearnerId, item_id: ItemId, now: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            item_id,
            exposure_count: 0,
            quiz_attempts: 0,
            quiz_correct: 0,
            consecutive_correct: 0,
            difficulty_score: INITIAL_DIFFICULTY,
            mastery_stage: MasteryStage::New,
            next_review_at: now,
            first_exposed_at: None,
            last_exposed_at: None,
            last_quiz_at: None,
            study_time_ms: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if counters are inconsistent or the difficulty
    /// is outside `[MIN_DIFFICULTY, MAX_DIFFICULTY]` (NaN included).
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        item_id: ItemId,
        exposure_count: u32,
        quiz_attempts: u32,
        quiz_correct: u32,
        consecutive_correct: u32,
        difficulty_score: f64,
        mastery_stage: MasteryStage,
        next_review_at: DateTime<Utc>,
        first_exposed_at: Option<DateTime<Utc>>,
        last_exposed_at: Option<DateTime<Utc>>,
        last_quiz_at: Option<DateTime<Utc>>,
        study_time_ms: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty_score) {
            return Err(ProgressError::InvalidDifficulty(difficulty_score));
        }
        if quiz_correct > quiz_attempts {
            return Err(ProgressError::CorrectExceedsAttempts {
                correct: quiz_correct,
                attempts: quiz_attempts,
            });
        }
        if consecutive_correct > quiz_correct {
            return Err(ProgressError::StreakExceedsCorrect {
                streak: consecutive_correct,
                correct: quiz_correct,
            });
        }

        Ok(Self {
            learner_id,
            item_id,
            exposure_count,
            quiz_attempts,
            quiz_correct,
            consecutive_correct,
            difficulty_score,
            mastery_stage,
            next_review_at,
            first_exposed_at,
            last_exposed_at,
            last_quiz_at,
            study_time_ms,
            created_at,
            updated_at,
        })
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    #[must_use]
    pub fn exposure_count(&self) -> u32 {
        self.exposure_count
    }

    #[must_use]
    pub fn quiz_attempts(&self) -> u32 {
        self.quiz_attempts
    }

    #[must_use]
    pub fn quiz_correct(&self) -> u32 {
        self.quiz_correct
    }

    #[must_use]
    pub fn consecutive_correct(&self) -> u32 {
        self.consecutive_correct
    }

    #[must_use]
    pub fn difficulty_score(&self) -> f64 {
        self.difficulty_score
    }

    #[must_use]
    pub fn mastery_stage(&self) -> MasteryStage {
        self.mastery_stage
    }

    #[must_use]
    pub fn next_review_at(&self) -> DateTime<Utc> {
        self.next_review_at
    }

    #[must_use]
    pub fn first_exposed_at(&self) -> Option<DateTime<Utc>> {
        self.first_exposed_at
    }

    #[must_use]
    pub fn last_exposed_at(&self) -> Option<DateTime<Utc>> {
        self.last_exposed_at
    }

    #[must_use]
    pub fn last_quiz_at(&self) -> Option<DateTime<Utc>> {
        self.last_quiz_at
    }

    /// Sum of reported response times, in milliseconds.
    #[must_use]
    pub fn study_time_ms(&self) -> u64 {
        self.study_time_ms
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Lifetime quiz accuracy, or `None` before the first quiz answer.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        if self.quiz_attempts == 0 {
            None
        } else {
            Some(f64::from(self.quiz_correct) / f64::from(self.quiz_attempts))
        }
    }

    /// True once any interaction has been recorded for this pair.
    #[must_use]
    pub fn has_history(&self) -> bool {
        self.exposure_count > 0 || self.quiz_attempts > 0
    }

    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    pub(crate) fn record_exposure(&mut self, response_ms: u64, now: DateTime<Utc>) {
        self.exposure_count = self.exposure_count.saturating_add(1);
        self.first_exposed_at.get_or_insert(now);
        self.last_exposed_at = Some(now);
        self.study_time_ms = self.study_time_ms.saturating_add(response_ms);
        self.updated_at = now;
    }

    pub(crate) fn record_quiz(&mut self, correct: bool, response_ms: u64, now: DateTime<Utc>) {
        self.quiz_attempts = self.quiz_attempts.saturating_add(1);
        if correct {
            self.quiz_correct = self.quiz_correct.saturating_add(1);
            self.consecutive_correct = self.consecutive_correct.saturating_add(1);
        } else {
            self.consecutive_correct = 0;
        }
        self.last_quiz_at = Some(now);
        self.study_time_ms = self.study_time_ms.saturating_add(response_ms);
        self.updated_at = now;
    }

    pub(crate) fn set_difficulty(&mut self, score: f64) {
        self.difficulty_score = score;
    }

    pub(crate) fn set_stage(&mut self, stage: MasteryStage) {
        self.mastery_stage = stage;
    }

    pub(crate) fn set_next_review_at(&mut self, at: DateTime<Utc>) {
        self.next_review_at = at;
    }
}
