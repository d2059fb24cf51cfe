use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{ItemId, LearnerId, SessionId};
use crate::model::session::Direction;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Malformed interaction data, rejected before any progress is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InteractionError {
    #[error("quiz interaction is missing its correctness value")]
    MissingCorrectness,

    #[error("exposure interaction cannot carry a correctness value")]
    UnexpectedCorrectness,

    #[error("response time must be non-negative, got {0} ms")]
    NegativeResponseTime(i64),

    #[error("invalid interaction kind: {0}")]
    InvalidKind(String),
}

//
// ─── INTERACTION ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// The learner viewed or flipped the item.
    Exposure,
    /// The learner answered a multiple-choice question.
    Quiz,
}

impl InteractionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InteractionKind::Exposure => "exposure",
            InteractionKind::Quiz => "quiz",
        }
    }

    /// # Errors
    ///
    /// Returns `InteractionError::InvalidKind` for unknown values.
    pub fn parse(value: &str) -> Result<Self, InteractionError> {
        match value {
            "exposure" => Ok(InteractionKind::Exposure),
            "quiz" => Ok(InteractionKind::Quiz),
            other => Err(InteractionError::InvalidKind(other.to_owned())),
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single learner event as reported by the caller.
///
/// Kept in its raw shape so malformed input can be represented and rejected;
/// [`Interaction::outcome`] is the only way the engine reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub correct: Option<bool>,
    pub response_time_ms: Option<i64>,
}

/// Checked view of an [`Interaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exposure { response_ms: Option<u64> },
    Quiz { correct: bool, response_ms: Option<u64> },
}

impl Outcome {
    #[must_use]
    pub fn response_ms(&self) -> Option<u64> {
        match self {
            Outcome::Exposure { response_ms } | Outcome::Quiz { response_ms, .. } => *response_ms,
        }
    }

    #[must_use]
    pub fn correct(&self) -> Option<bool> {
        match self {
            Outcome::Exposure { .. } => None,
            Outcome::Quiz { correct, .. } => Some(*correct),
        }
    }
}

impl Interaction {
    #[must_use]
    pub fn exposure(response_time_ms: Option<i64>) -> Self {
        Self {
            kind: InteractionKind::Exposure,
            correct: None,
            response_time_ms,
        }
    }

    #[must_use]
    pub fn quiz(correct: bool, response_time_ms: Option<i64>) -> Self {
        Self {
            kind: InteractionKind::Quiz,
            correct: Some(correct),
            response_time_ms,
        }
    }

    /// Validate the raw fields.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError` if a quiz has no correctness value, an
    /// exposure carries one, or the response time is negative.
    pub fn outcome(&self) -> Result<Outcome, InteractionError> {
        let response_ms = match self.response_time_ms {
            Some(ms) if ms < 0 => return Err(InteractionError::NegativeResponseTime(ms)),
            Some(ms) => Some(ms.unsigned_abs()),
            None => None,
        };

        match (self.kind, self.correct) {
            (InteractionKind::Exposure, None) => Ok(Outcome::Exposure { response_ms }),
            (InteractionKind::Exposure, Some(_)) => Err(InteractionError::UnexpectedCorrectness),
            (InteractionKind::Quiz, Some(correct)) => Ok(Outcome::Quiz {
                correct,
                response_ms,
            }),
            (InteractionKind::Quiz, None) => Err(InteractionError::MissingCorrectness),
        }
    }
}

//
// ─── INTERACTION LOG ───────────────────────────────────────────────────────────
//

/// Append-only log entry for an accepted interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: Option<i64>,
    pub session_id: SessionId,
    pub learner_id: LearnerId,
    pub item_id: ItemId,
    pub direction: Direction,
    pub interaction: Interaction,
    pub occurred_at: DateTime<Utc>,
}

impl InteractionRecord {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        learner_id: LearnerId,
        item_id: ItemId,
        direction: Direction,
        interaction: Interaction,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            session_id,
            learner_id,
            item_id,
            direction,
            interaction,
            occurred_at,
        }
    }
}
