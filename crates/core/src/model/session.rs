use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{CollectionId, LearnerId, SessionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSummaryError {
    #[error("closed_at is before started_at")]
    InvalidTimeRange,

    #[error("session duration must be non-negative, got {0}s")]
    NegativeDuration(i64),

    #[error("correct answers ({correct}) exceed quiz attempts ({attempts})")]
    CorrectExceedsAttempts { correct: u32, attempts: u32 },

    #[error("items served ({served}) does not match exposures + quiz attempts ({sum})")]
    CountMismatch { served: u32, sum: u32 },

    #[error("response samples ({samples}) exceed quiz attempts ({attempts})")]
    TooManyResponseSamples { samples: u32, attempts: u32 },

    #[error("invalid {field}: {value}")]
    InvalidLabel { field: &'static str, value: String },
}

//
// ─── DIRECTION / STATE ─────────────────────────────────────────────────────────
//

/// Which side of an item is shown and which side is recalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    PromptToTranslation,
    TranslationToPrompt,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::PromptToTranslation => "prompt_to_translation",
            Direction::TranslationToPrompt => "translation_to_prompt",
        }
    }

    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidLabel` for unknown values.
    pub fn parse(value: &str) -> Result<Self, SessionSummaryError> {
        match value {
            "prompt_to_translation" => Ok(Direction::PromptToTranslation),
            "translation_to_prompt" => Ok(Direction::TranslationToPrompt),
            other => Err(SessionSummaryError::InvalidLabel {
                field: "direction",
                value: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a study session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Open,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The caller ended the session.
    Explicit,
    /// The session sat idle past the configured timeout.
    TimedOut,
}

impl CloseReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Explicit => "explicit",
            CloseReason::TimedOut => "timed_out",
        }
    }

    /// # Errors
    ///
    /// Returns `SessionSummaryError::InvalidLabel` for unknown values.
    pub fn parse(value: &str) -> Result<Self, SessionSummaryError> {
        match value {
            "explicit" => Ok(CloseReason::Explicit),
            "timed_out" => Ok(CloseReason::TimedOut),
            other => Err(SessionSummaryError::InvalidLabel {
                field: "close_reason",
                value: other.to_owned(),
            }),
        }
    }
}

//
// ─── TALLY ─────────────────────────────────────────────────────────────────────
//

/// Session-scoped counters, updated once per accepted interaction or batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTally {
    /// Interactions recorded (exposures + quiz answers).
    pub items_served: u32,
    pub correct_count: u32,
    pub exposures: u32,
    pub quiz_attempts: u32,
    /// Distinct items that received at least one interaction.
    pub unique_items: u32,
    /// Item ids handed out across all batches, repeats included.
    pub items_presented: u32,
    pub batches_served: u32,
    pub quiz_response_ms_total: u64,
    pub quiz_response_samples: u32,
}

impl SessionTally {
    /// Lifetime quiz accuracy within the session, if any quiz was answered.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        (self.quiz_attempts > 0)
            .then(|| f64::from(self.correct_count) / f64::from(self.quiz_attempts))
    }

    /// Mean reported quiz response time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_response_ms(&self) -> Option<f64> {
        (self.quiz_response_samples > 0)
            .then(|| self.quiz_response_ms_total as f64 / f64::from(self.quiz_response_samples))
    }
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Immutable statistics for a closed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    session_id: SessionId,
    learner_id: LearnerId,
    collection_id: CollectionId,
    direction: Direction,
    started_at: DateTime<Utc>,
    closed_at: DateTime<Utc>,
    duration_secs: i64,
    close_reason: CloseReason,
    tally: SessionTally,
}

impl SessionSummary {
    /// Build or rehydrate a summary, checking that counters agree.
    ///
    /// # Errors
    ///
    /// Returns `SessionSummaryError` when timestamps, duration or counters are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        session_id: SessionId,
        learner_id: LearnerId,
        collection_id: CollectionId,
        direction: Direction,
        started_at: DateTime<Utc>,
        closed_at: DateTime<Utc>,
        duration_secs: i64,
        close_reason: CloseReason,
        tally: SessionTally,
    ) -> Result<Self, SessionSummaryError> {
        if closed_at < started_at {
            return Err(SessionSummaryError::InvalidTimeRange);
        }
        if duration_secs < 0 {
            return Err(SessionSummaryError::NegativeDuration(duration_secs));
        }
        if tally.correct_count > tally.quiz_attempts {
            return Err(SessionSummaryError::CorrectExceedsAttempts {
                correct: tally.correct_count,
                attempts: tally.quiz_attempts,
            });
        }
        let sum = tally.exposures.saturating_add(tally.quiz_attempts);
        if sum != tally.items_served {
            return Err(SessionSummaryError::CountMismatch {
                served: tally.items_served,
                sum,
            });
        }
        if tally.quiz_response_samples > tally.quiz_attempts {
            return Err(SessionSummaryError::TooManyResponseSamples {
                samples: tally.quiz_response_samples,
                attempts: tally.quiz_attempts,
            });
        }

        Ok(Self {
            session_id,
            learner_id,
            collection_id,
            direction,
            started_at,
            closed_at,
            duration_secs,
            close_reason,
            tally,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn closed_at(&self) -> DateTime<Utc> {
        self.closed_at
    }

    #[must_use]
    pub fn duration_secs(&self) -> i64 {
        self.duration_secs
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }

    #[must_use]
    pub fn close_reason(&self) -> CloseReason {
        self.close_reason
    }

    #[must_use]
    pub fn tally(&self) -> &SessionTally {
        &self.tally
    }

    #[must_use]
    pub fn items_served(&self) -> u32 {
        self.tally.items_served
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.tally.correct_count
    }

    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        self.tally.accuracy()
    }

    #[must_use]
    pub fn average_response_ms(&self) -> Option<f64> {
        self.tally.average_response_ms()
    }
}
