use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::model::{MasteryStage, ProgressRecord};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

//
// ─── SCHEDULED REVIEW ──────────────────────────────────────────────────────────
//

/// Result of rescheduling after a quiz answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReview {
    pub next_review_at: DateTime<Utc>,
    /// Fractional days between `now` and `next_review_at`.
    pub interval_days: f64,
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// Stage-based interval scheduler.
///
/// A correct answer stretches the stage's base interval by
/// `correct_numerator / difficulty`; an incorrect one shrinks it by a fixed
/// factor regardless of difficulty. Intervals keep sub-day precision.
///
/// # Examples
///
/// ```
/// # use vocab_core::model::MasteryStage;
/// # use vocab_core::scheduler::Scheduler;
/// let scheduler = Scheduler::default();
/// let days = scheduler.interval_days(MasteryStage::Review, 1.25, true);
/// assert!((days - 11.2).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn interval_days(&self, stage: MasteryStage, difficulty: f64, was_correct: bool) -> f64 {
        let base = self.config.base_days(stage);
        if was_correct {
            base * (self.config.correct_numerator / difficulty)
        } else {
            base * self.config.incorrect_factor
        }
    }

    #[must_use]
    pub fn next_review(
        &self,
        stage: MasteryStage,
        difficulty: f64,
        was_correct: bool,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let days = self.interval_days(stage, difficulty, was_correct);
        now + interval_duration(days)
    }

    /// Update `record.next_review_at` from its (already evaluated) stage and difficulty.
    pub fn reschedule(
        &self,
        record: &mut ProgressRecord,
        was_correct: bool,
        now: DateTime<Utc>,
    ) -> ScheduledReview {
        let interval_days =
            self.interval_days(record.mastery_stage(), record.difficulty_score(), was_correct);
        let next_review_at = now + interval_duration(interval_days);
        record.set_next_review_at(next_review_at);
        ScheduledReview {
            next_review_at,
            interval_days,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn interval_duration(days: f64) -> Duration {
    let millis = (days * MILLIS_PER_DAY).round();
    if millis.is_finite() {
        Duration::milliseconds(millis as i64)
    } else {
        Duration::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, LearnerId};
    use crate::time::fixed_now;

    #[test]
    fn correct_answer_scales_with_difficulty() {
        let scheduler = Scheduler::default();
        let now = fixed_now();
        let due = scheduler.next_review(MasteryStage::Review, 1.25, true, now);
        // 11.2 days
        assert_eq!(due - now, Duration::days(11) + Duration::hours(4) + Duration::minutes(48));
    }

    #[test]
    fn incorrect_answer_halves_base_interval() {
        let scheduler = Scheduler::default();
        let now = fixed_now();
        let due = scheduler.next_review(MasteryStage::Mastered, 4.0, false, now);
        assert_eq!(due - now, Duration::days(15));
        assert_eq!(
            scheduler.interval_days(MasteryStage::Mastered, 0.1, false),
            15.0
        );
    }

    #[test]
    fn harder_items_come_back_sooner() {
        let scheduler = Scheduler::default();
        let easy = scheduler.interval_days(MasteryStage::Learning, 0.5, true);
        let hard = scheduler.interval_days(MasteryStage::Learning, 4.0, true);
        assert!(hard < easy);
        assert_eq!(hard, 1.5);
    }

    #[test]
    fn fractional_days_are_not_rounded_up() {
        let scheduler = Scheduler::default();
        let now = fixed_now();
        let due = scheduler.next_review(MasteryStage::New, 5.0, true, now);
        assert_eq!(due - now, Duration::hours(9) + Duration::minutes(36));
    }

    #[test]
    fn reschedule_writes_next_review() {
        let scheduler = Scheduler::default();
        let now = fixed_now();
        let mut record = ProgressRecord::unseen(LearnerId::new(1), ItemId::new(1), now);
        let scheduled = scheduler.reschedule(&mut record, true, now);
        assert_eq!(scheduled.interval_days, 2.0);
        assert_eq!(record.next_review_at(), now + Duration::days(2));
        assert_eq!(scheduled.next_review_at, record.next_review_at());
    }
}
