//! Tunable weights and thresholds for the study engine.
//!
//! Every component takes its slice of [`EngineConfig`] at construction time.
//! Defaults reproduce the stock learning curve; tests build alternates freely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{MAX_DIFFICULTY, MIN_DIFFICULTY, MasteryStage};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("difficulty bounds are inverted: min {min} > max {max}")]
    InvertedBounds { min: f64, max: f64 },

    #[error("difficulty bounds [{min}, {max}] must lie within [0.1, 5.0]")]
    BoundsOutOfRange { min: f64, max: f64 },

    #[error("fast response threshold ({fast} ms) must be below slow threshold ({slow} ms)")]
    InvertedResponseThresholds { fast: u64, slow: u64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("a quiz needs at least 2 choices, got {0}")]
    TooFewChoices(usize),
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { field, value })
    }
}

//
// ─── EVALUATOR ─────────────────────────────────────────────────────────────────
//

/// Minimum volume and accuracy needed to reach a mastery stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageThreshold {
    pub min_attempts: u32,
    pub min_accuracy: f64,
}

impl StageThreshold {
    #[must_use]
    pub const fn new(min_attempts: u32, min_accuracy: f64) -> Self {
        Self {
            min_attempts,
            min_accuracy,
        }
    }

    #[must_use]
    pub fn is_met(&self, attempts: u32, accuracy: f64) -> bool {
        attempts >= self.min_attempts && accuracy >= self.min_accuracy
    }
}

/// Extra easing for an item answered correctly after a run of correct answers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreakBonus {
    /// Streak length (before the current answer) that unlocks the bonus.
    pub min_streak: u32,
    pub factor: f64,
}

impl Default for StreakBonus {
    fn default() -> Self {
        Self {
            min_streak: 3,
            factor: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub correct_factor: f64,
    pub incorrect_factor: f64,
    pub min_difficulty: f64,
    pub max_difficulty: f64,
    pub slow_response_ms: u64,
    pub slow_factor: f64,
    pub fast_response_ms: u64,
    pub fast_factor: f64,
    pub mastered: StageThreshold,
    pub review: StageThreshold,
    pub learning: StageThreshold,
    /// Disabled unless configured.
    pub streak_bonus: Option<StreakBonus>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            correct_factor: 0.85,
            incorrect_factor: 1.4,
            min_difficulty: 0.1,
            max_difficulty: 5.0,
            slow_response_ms: 10_000,
            slow_factor: 1.2,
            fast_response_ms: 2_000,
            fast_factor: 0.9,
            mastered: StageThreshold::new(10, 0.8),
            review: StageThreshold::new(5, 0.6),
            learning: StageThreshold::new(2, 0.4),
            streak_bonus: None,
        }
    }
}

impl EvaluatorConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` when a factor or bound is non-positive, the
    /// bounds are inverted or leave `[0.1, 5.0]`, or the response thresholds overlap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("evaluator.correct_factor", self.correct_factor)?;
        positive("evaluator.incorrect_factor", self.incorrect_factor)?;
        positive("evaluator.min_difficulty", self.min_difficulty)?;
        positive("evaluator.max_difficulty", self.max_difficulty)?;
        positive("evaluator.slow_factor", self.slow_factor)?;
        positive("evaluator.fast_factor", self.fast_factor)?;
        if self.min_difficulty > self.max_difficulty {
            return Err(ConfigError::InvertedBounds {
                min: self.min_difficulty,
                max: self.max_difficulty,
            });
        }
        if self.min_difficulty < MIN_DIFFICULTY || self.max_difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::BoundsOutOfRange {
                min: self.min_difficulty,
                max: self.max_difficulty,
            });
        }
        if self.fast_response_ms >= self.slow_response_ms {
            return Err(ConfigError::InvertedResponseThresholds {
                fast: self.fast_response_ms,
                slow: self.slow_response_ms,
            });
        }
        unit("evaluator.mastered.min_accuracy", self.mastered.min_accuracy)?;
        unit("evaluator.review.min_accuracy", self.review.min_accuracy)?;
        unit("evaluator.learning.min_accuracy", self.learning.min_accuracy)?;
        if let Some(bonus) = &self.streak_bonus {
            positive("evaluator.streak_bonus.factor", bonus.factor)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn clamp(&self, score: f64) -> f64 {
        score.clamp(self.min_difficulty, self.max_difficulty)
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub new_days: f64,
    pub learning_days: f64,
    pub review_days: f64,
    pub mastered_days: f64,
    /// Correct answers scale the base interval by `correct_numerator / difficulty`.
    pub correct_numerator: f64,
    /// Incorrect answers scale the base interval by this factor.
    pub incorrect_factor: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            new_days: 1.0,
            learning_days: 3.0,
            review_days: 7.0,
            mastered_days: 30.0,
            correct_numerator: 2.0,
            incorrect_factor: 0.5,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn base_days(&self, stage: MasteryStage) -> f64 {
        match stage {
            MasteryStage::New => self.new_days,
            MasteryStage::Learning => self.learning_days,
            MasteryStage::Review => self.review_days,
            MasteryStage::Mastered => self.mastered_days,
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigError::NotPositive` for any non-positive interval or factor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("scheduler.new_days", self.new_days)?;
        positive("scheduler.learning_days", self.learning_days)?;
        positive("scheduler.review_days", self.review_days)?;
        positive("scheduler.mastered_days", self.mastered_days)?;
        positive("scheduler.correct_numerator", self.correct_numerator)?;
        positive("scheduler.incorrect_factor", self.incorrect_factor)
    }
}

//
// ─── SELECTION ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub new_weight: f64,
    pub learning_weight: f64,
    pub review_weight: f64,
    pub mastered_weight: f64,
    pub overdue_multiplier: f64,
    /// Difficulty that maps to a neutral multiplier of 1.0.
    pub difficulty_pivot: f64,
    pub include_overdue: bool,
    /// Fixed seed for reproducible selection. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            new_weight: 2.0,
            learning_weight: 1.2,
            review_weight: 1.0,
            mastered_weight: 0.3,
            overdue_multiplier: 1.5,
            difficulty_pivot: 2.5,
            include_overdue: true,
            seed: None,
        }
    }
}

impl SelectionConfig {
    #[must_use]
    pub fn base_weight(&self, stage: MasteryStage) -> f64 {
        match stage {
            MasteryStage::New => self.new_weight,
            MasteryStage::Learning => self.learning_weight,
            MasteryStage::Review => self.review_weight,
            MasteryStage::Mastered => self.mastered_weight,
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigError::NotPositive` for any non-positive weight or multiplier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("selection.new_weight", self.new_weight)?;
        positive("selection.learning_weight", self.learning_weight)?;
        positive("selection.review_weight", self.review_weight)?;
        positive("selection.mastered_weight", self.mastered_weight)?;
        positive("selection.overdue_multiplier", self.overdue_multiplier)?;
        positive("selection.difficulty_pivot", self.difficulty_pivot)
    }
}

//
// ─── SESSION / QUIZ ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity after which a session is closed as timed out.
    pub idle_timeout_secs: u64,
    pub default_batch_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            default_batch_size: 10,
        }
    }
}

impl SessionConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Zero` if the timeout or batch size is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Zero {
                field: "session.idle_timeout_secs",
            });
        }
        if self.default_batch_size == 0 {
            return Err(ConfigError::Zero {
                field: "session.default_batch_size",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    /// Options per multiple-choice question, the answer included.
    pub choices: usize,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self { choices: 4 }
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub evaluator: EvaluatorConfig,
    pub scheduler: SchedulerConfig,
    pub selection: SelectionConfig,
    pub session: SessionConfig,
    pub quiz: QuizConfig,
}

impl EngineConfig {
    /// # Errors
    ///
    /// Returns the first `ConfigError` found in any section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.evaluator.validate()?;
        self.scheduler.validate()?;
        self.selection.validate()?;
        self.session.validate()?;
        if self.quiz.choices < 2 {
            return Err(ConfigError::TooFewChoices(self.quiz.choices));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"selection": {"seed": 7, "new_weight": 3.0}}"#).unwrap();
        assert_eq!(config.selection.seed, Some(7));
        assert_eq!(config.selection.new_weight, 3.0);
        assert_eq!(config.selection.mastered_weight, 0.3);
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let mut config = EngineConfig::default();
        config.evaluator.min_difficulty = 6.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn difficulty_bounds_cannot_widen_past_stored_range() {
        let mut config = EngineConfig::default();
        config.evaluator.max_difficulty = 8.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BoundsOutOfRange { .. })
        ));

        let mut narrower = EngineConfig::default();
        narrower.evaluator.min_difficulty = 0.5;
        narrower.evaluator.max_difficulty = 4.0;
        assert!(narrower.validate().is_ok());
    }

    #[test]
    fn zero_weight_is_rejected() {
        let mut config = EngineConfig::default();
        config.selection.review_weight = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "selection.review_weight",
                value: 0.0
            })
        );
    }

    #[test]
    fn stage_lookups_follow_stage() {
        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.base_days(MasteryStage::Mastered), 30.0);
        let selection = SelectionConfig::default();
        assert_eq!(selection.base_weight(MasteryStage::New), 2.0);
    }
}
