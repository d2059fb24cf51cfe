//! Difficulty and mastery updates for a single interaction.

use chrono::{DateTime, Utc};

use crate::config::EvaluatorConfig;
use crate::model::{Interaction, InteractionError, MasteryStage, Outcome, ProgressRecord};

/// Pure function of (record, interaction) to updated record.
///
/// Never touches `next_review_at`; that belongs to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    #[must_use]
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Apply one interaction and return the updated copy.
    ///
    /// Exposures only bump exposure counters. Quizzes adjust difficulty
    /// (correctness first, then response time), update the streak and
    /// recompute the mastery stage from lifetime accuracy.
    ///
    /// # Errors
    ///
    /// Returns `InteractionError` for malformed interactions; `record` is untouched.
    pub fn evaluate(
        &self,
        record: &ProgressRecord,
        interaction: &Interaction,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, InteractionError> {
        let outcome = interaction.outcome()?;
        let mut next = record.clone();

        match outcome {
            Outcome::Exposure { response_ms } => {
                next.record_exposure(response_ms.unwrap_or(0), now);
            }
            Outcome::Quiz {
                correct,
                response_ms,
            } => {
                let score = self.next_difficulty(record, correct, response_ms);
                next.set_difficulty(score);
                next.record_quiz(correct, response_ms.unwrap_or(0), now);
                next.set_stage(self.mastery_stage_for(next.quiz_attempts(), next.quiz_correct()));
            }
        }

        Ok(next)
    }

    fn next_difficulty(
        &self,
        record: &ProgressRecord,
        correct: bool,
        response_ms: Option<u64>,
    ) -> f64 {
        let cfg = &self.config;
        let factor = if correct {
            cfg.correct_factor
        } else {
            cfg.incorrect_factor
        };
        let mut score = cfg.clamp(record.difficulty_score() * factor);

        let streak_bonus = cfg
            .streak_bonus
            .filter(|bonus| correct && record.consecutive_correct() >= bonus.min_streak);
        if let Some(bonus) = streak_bonus {
            score = cfg.clamp(score * bonus.factor);
        }

        match response_ms {
            Some(ms) if ms > cfg.slow_response_ms => cfg.clamp(score * cfg.slow_factor),
            Some(ms) if ms < cfg.fast_response_ms => cfg.clamp(score * cfg.fast_factor),
            _ => score,
        }
    }

    /// Stage implied by lifetime quiz volume and accuracy.
    ///
    /// Not a ratchet: falling accuracy demotes the stage.
    #[must_use]
    pub fn mastery_stage_for(&self, attempts: u32, correct: u32) -> MasteryStage {
        if attempts == 0 {
            return MasteryStage::New;
        }
        let accuracy = f64::from(correct) / f64::from(attempts);
        let cfg = &self.config;
        if cfg.mastered.is_met(attempts, accuracy) {
            MasteryStage::Mastered
        } else if cfg.review.is_met(attempts, accuracy) {
            MasteryStage::Review
        } else if cfg.learning.is_met(attempts, accuracy) {
            MasteryStage::Learning
        } else {
            MasteryStage::New
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreakBonus;
    use crate::model::{ItemId, LearnerId};
    use crate::time::fixed_now;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const NEUTRAL_MS: Option<i64> = Some(5_000);

    fn unseen() -> ProgressRecord {
        ProgressRecord::unseen(LearnerId::new(1), ItemId::new(1), fixed_now())
    }

    fn record(attempts: u32, correct: u32, difficulty: f64, stage: MasteryStage) -> ProgressRecord {
        let now = fixed_now();
        ProgressRecord::from_persisted(
            LearnerId::new(1),
            ItemId::new(1),
            0,
            attempts,
            correct,
            0,
            difficulty,
            stage,
            now,
            None,
            None,
            None,
            0,
            now,
            now,
        )
        .unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn exposure_only_bumps_exposure_count() {
        let evaluator = Evaluator::default();
        let before = unseen();
        let after = evaluator
            .evaluate(&before, &Interaction::exposure(Some(1_500)), fixed_now())
            .unwrap();

        assert_eq!(after.exposure_count(), 1);
        assert_eq!(after.quiz_attempts(), 0);
        assert_eq!(after.difficulty_score(), before.difficulty_score());
        assert_eq!(after.mastery_stage(), MasteryStage::New);
        assert_eq!(after.next_review_at(), before.next_review_at());
        assert_eq!(after.study_time_ms(), 1_500);
    }

    #[test]
    fn correct_answer_eases_difficulty() {
        let after = Evaluator::default()
            .evaluate(&unseen(), &Interaction::quiz(true, NEUTRAL_MS), fixed_now())
            .unwrap();
        assert!(approx(after.difficulty_score(), 0.85));
        assert_eq!(after.quiz_attempts(), 1);
        assert_eq!(after.quiz_correct(), 1);
        assert_eq!(after.consecutive_correct(), 1);
    }

    #[test]
    fn incorrect_answer_hardens_and_resets_streak() {
        let evaluator = Evaluator::default();
        let now = fixed_now();
        let once = evaluator
            .evaluate(&unseen(), &Interaction::quiz(true, NEUTRAL_MS), now)
            .unwrap();
        let twice = evaluator
            .evaluate(&once, &Interaction::quiz(false, NEUTRAL_MS), now)
            .unwrap();
        assert!(approx(twice.difficulty_score(), 0.85 * 1.4));
        assert_eq!(twice.consecutive_correct(), 0);
        assert_eq!(twice.quiz_correct(), 1);
        assert_eq!(twice.quiz_attempts(), 2);
    }

    #[test]
    fn response_time_refines_after_correctness() {
        let evaluator = Evaluator::default();
        let now = fixed_now();
        let slow = evaluator
            .evaluate(&unseen(), &Interaction::quiz(false, Some(12_000)), now)
            .unwrap();
        assert!(approx(slow.difficulty_score(), 1.4 * 1.2));

        let fast = evaluator
            .evaluate(&unseen(), &Interaction::quiz(true, Some(800)), now)
            .unwrap();
        assert!(approx(fast.difficulty_score(), 0.85 * 0.9));

        let unknown = evaluator
            .evaluate(&unseen(), &Interaction::quiz(true, None), now)
            .unwrap();
        assert!(approx(unknown.difficulty_score(), 0.85));
    }

    #[test]
    fn difficulty_stays_within_bounds() {
        let evaluator = Evaluator::default();
        let now = fixed_now();
        let mut hard = unseen();
        for _ in 0..50 {
            hard = evaluator
                .evaluate(&hard, &Interaction::quiz(false, Some(60_000)), now)
                .unwrap();
            assert!(hard.difficulty_score() <= 5.0);
        }
        assert!(approx(hard.difficulty_score(), 5.0));

        let mut easy = unseen();
        for _ in 0..50 {
            easy = evaluator
                .evaluate(&easy, &Interaction::quiz(true, Some(100)), now)
                .unwrap();
            assert!(easy.difficulty_score() >= 0.1);
        }
        assert!(approx(easy.difficulty_score(), 0.1));
    }

    #[test]
    fn difficulty_stays_within_bounds_for_mixed_sequences() {
        let evaluator = Evaluator::default();
        let now = fixed_now();
        let mut rng = StdRng::seed_from_u64(2024);

        for _ in 0..20 {
            let mut rec = unseen();
            for _ in 0..200 {
                let response_ms = if rng.random_bool(0.8) {
                    Some(rng.random_range(0..20_000))
                } else {
                    None
                };
                let interaction = if rng.random_bool(0.2) {
                    Interaction::exposure(response_ms)
                } else {
                    Interaction::quiz(rng.random_bool(0.5), response_ms)
                };
                rec = evaluator.evaluate(&rec, &interaction, now).unwrap();

                let d = rec.difficulty_score();
                assert!((0.1..=5.0).contains(&d), "difficulty {d} left bounds");
            }
        }
    }

    #[test]
    fn mastery_falls_back_when_accuracy_drops() {
        let evaluator = Evaluator::default();
        let now = fixed_now();
        let mut rec = record(10, 9, 1.0, MasteryStage::Mastered);
        for _ in 0..5 {
            rec = evaluator
                .evaluate(&rec, &Interaction::quiz(false, NEUTRAL_MS), now)
                .unwrap();
        }
        assert_eq!(rec.quiz_attempts(), 15);
        assert_eq!(rec.quiz_correct(), 9);
        assert_eq!(rec.mastery_stage(), MasteryStage::Review);
    }

    #[test]
    fn stage_thresholds() {
        let evaluator = Evaluator::default();
        assert_eq!(evaluator.mastery_stage_for(0, 0), MasteryStage::New);
        assert_eq!(evaluator.mastery_stage_for(1, 1), MasteryStage::New);
        assert_eq!(evaluator.mastery_stage_for(2, 1), MasteryStage::Learning);
        assert_eq!(evaluator.mastery_stage_for(5, 3), MasteryStage::Review);
        assert_eq!(evaluator.mastery_stage_for(10, 8), MasteryStage::Mastered);
        assert_eq!(evaluator.mastery_stage_for(10, 7), MasteryStage::Review);
        assert_eq!(evaluator.mastery_stage_for(4, 1), MasteryStage::New);
    }

    #[test]
    fn malformed_interactions_are_rejected() {
        let evaluator = Evaluator::default();
        let now = fixed_now();
        let missing = Interaction {
            correct: None,
            ..Interaction::quiz(true, None)
        };
        assert_eq!(
            evaluator.evaluate(&unseen(), &missing, now).unwrap_err(),
            InteractionError::MissingCorrectness
        );
        assert_eq!(
            evaluator
                .evaluate(&unseen(), &Interaction::quiz(true, Some(-5)), now)
                .unwrap_err(),
            InteractionError::NegativeResponseTime(-5)
        );
    }

    #[test]
    fn streak_bonus_applies_only_when_enabled() {
        let now = fixed_now();
        let mut rec = unseen();
        let plain = Evaluator::default();
        for _ in 0..3 {
            rec = plain
                .evaluate(&rec, &Interaction::quiz(true, NEUTRAL_MS), now)
                .unwrap();
        }
        assert_eq!(rec.consecutive_correct(), 3);

        let without = plain
            .evaluate(&rec, &Interaction::quiz(true, NEUTRAL_MS), now)
            .unwrap();
        let boosted = Evaluator::new(EvaluatorConfig {
            streak_bonus: Some(StreakBonus::default()),
            ..EvaluatorConfig::default()
        })
        .evaluate(&rec, &Interaction::quiz(true, NEUTRAL_MS), now)
        .unwrap();

        assert!(approx(
            boosted.difficulty_score(),
            without.difficulty_score() * 0.9
        ));
    }
}
