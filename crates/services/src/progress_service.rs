use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use vocab_core::{
    config::EngineConfig,
    evaluator::Evaluator,
    model::{InteractionRecord, ItemId, LearnerId, Outcome, ProgressRecord},
    scheduler::{ScheduledReview, Scheduler},
};
use storage::repository::{InteractionPersistence, ProgressRepository, StorageError};

use crate::error::ProgressServiceError;

/// Prune idle lock entries once the map grows past this size.
const LOCK_PRUNE_THRESHOLD: usize = 1_024;

type ProgressKey = (LearnerId, ItemId);

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

/// Outcome of one persisted interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedInteraction {
    /// Record as it was before this interaction (unseen default if new).
    pub previous: ProgressRecord,
    /// Record as stored after evaluation and scheduling.
    pub record: ProgressRecord,
    /// Present for quiz answers only; exposures never reschedule.
    pub scheduled: Option<ScheduledReview>,
    pub log_id: i64,
}

//
// ─── KEY LOCKS ─────────────────────────────────────────────────────────────────
//

/// One async mutex per (learner, item) so read-evaluate-write never interleaves
/// for the same record, while different records proceed in parallel.
#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<ProgressKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn handle(&self, key: ProgressKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if map.len() >= LOCK_PRUNE_THRESHOLD {
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(map.entry(key).or_default())
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Applies interactions to progress records: evaluate, schedule, persist.
#[derive(Clone)]
pub struct ProgressService {
    evaluator: Evaluator,
    scheduler: Scheduler,
    progress: Arc<dyn ProgressRepository>,
    writes: Arc<dyn InteractionPersistence>,
    locks: Arc<KeyLocks>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        progress: Arc<dyn ProgressRepository>,
        writes: Arc<dyn InteractionPersistence>,
    ) -> Self {
        Self {
            evaluator: Evaluator::new(config.evaluator.clone()),
            scheduler: Scheduler::new(config.scheduler.clone()),
            progress,
            writes,
            locks: Arc::new(KeyLocks::default()),
        }
    }

    /// Stored progress, or the unseen default when the learner never touched the item.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    pub async fn load(
        &self,
        learner_id: LearnerId,
        item_id: ItemId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<ProgressRecord, StorageError> {
        Ok(self
            .progress
            .get_progress(learner_id, item_id)
            .await?
            .unwrap_or_else(|| ProgressRecord::unseen(learner_id, item_id, now)))
    }

    /// Evaluate `log.interaction` against the stored record, reschedule on a quiz
    /// answer, and persist the log entry plus the new record together.
    ///
    /// Uses `log.occurred_at` as the evaluation time. Calls for the same
    /// (learner, item) are serialized.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Interaction` for malformed interactions
    /// (nothing is read or written) and `ProgressServiceError::Storage` if the
    /// store fails (nothing is committed).
    pub async fn apply(
        &self,
        log: InteractionRecord,
    ) -> Result<AppliedInteraction, ProgressServiceError> {
        let outcome = log.interaction.outcome()?;
        let now = log.occurred_at;
        let key = (log.learner_id, log.item_id);

        let lock = self.locks.handle(key);
        let _guard = lock.lock().await;

        let previous = self.load(log.learner_id, log.item_id, now).await?;
        let mut record = self.evaluator.evaluate(&previous, &log.interaction, now)?;

        let scheduled = match outcome {
            Outcome::Quiz { correct, .. } => {
                Some(self.scheduler.reschedule(&mut record, correct, now))
            }
            Outcome::Exposure { .. } => None,
        };

        let log_id = self.writes.apply_interaction(&record, log).await?;

        debug!(
            learner_id = %key.0,
            item_id = %key.1,
            log_id,
            stage = %record.mastery_stage(),
            difficulty = record.difficulty_score(),
            "interaction applied"
        );

        Ok(AppliedInteraction {
            previous,
            record,
            scheduled,
            log_id,
        })
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
