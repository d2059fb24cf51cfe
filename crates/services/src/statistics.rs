use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use storage::repository::{CollectionRepository, ItemRepository, ProgressRepository, Storage};
use vocab_core::model::{CollectionId, LearnerId, MasteryStage};

use crate::Clock;
use crate::error::SessionError;
use crate::sessions::{Candidate, SessionQueries};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MasteryDistribution {
    pub new: u32,
    pub learning: u32,
    pub review: u32,
    pub mastered: u32,
}

impl MasteryDistribution {
    fn bump(&mut self, stage: MasteryStage) {
        let slot = match stage {
            MasteryStage::New => &mut self.new,
            MasteryStage::Learning => &mut self.learning,
            MasteryStage::Review => &mut self.review,
            MasteryStage::Mastered => &mut self.mastered,
        };
        *slot = slot.saturating_add(1);
    }

    #[must_use]
    pub fn get(&self, stage: MasteryStage) -> u32 {
        match stage {
            MasteryStage::New => self.new,
            MasteryStage::Learning => self.learning,
            MasteryStage::Review => self.review,
            MasteryStage::Mastered => self.mastered,
        }
    }
}

/// A learner's standing over one collection. Unseen items count as New.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub learner_id: LearnerId,
    pub collection_id: CollectionId,
    pub total_items: u32,
    pub unseen_items: u32,
    pub mastery: MasteryDistribution,
    pub total_exposures: u32,
    pub total_attempts: u32,
    pub total_correct: u32,
    pub accuracy: Option<f64>,
    /// Mean difficulty over all items, unseen items at their default.
    pub average_difficulty: Option<f64>,
    /// Items with history whose review is due.
    pub overdue_items: u32,
    pub study_time_ms: u64,
}

impl CollectionStats {
    #[must_use]
    pub(crate) fn from_candidates(
        learner_id: LearnerId,
        collection_id: CollectionId,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self {
            learner_id,
            collection_id,
            total_items: 0,
            unseen_items: 0,
            mastery: MasteryDistribution::default(),
            total_exposures: 0,
            total_attempts: 0,
            total_correct: 0,
            accuracy: None,
            average_difficulty: None,
            overdue_items: 0,
            study_time_ms: 0,
        };

        let mut difficulty_sum = 0.0;
        for Candidate { progress, .. } in candidates {
            stats.total_items = stats.total_items.saturating_add(1);
            stats.mastery.bump(progress.mastery_stage());
            stats.total_exposures = stats.total_exposures.saturating_add(progress.exposure_count());
            stats.total_attempts = stats.total_attempts.saturating_add(progress.quiz_attempts());
            stats.total_correct = stats.total_correct.saturating_add(progress.quiz_correct());
            stats.study_time_ms = stats.study_time_ms.saturating_add(progress.study_time_ms());
            difficulty_sum += progress.difficulty_score();

            if !progress.has_history() {
                stats.unseen_items = stats.unseen_items.saturating_add(1);
            } else if progress.is_overdue(now) {
                stats.overdue_items = stats.overdue_items.saturating_add(1);
            }
        }

        if stats.total_attempts > 0 {
            stats.accuracy =
                Some(f64::from(stats.total_correct) / f64::from(stats.total_attempts));
        }
        if stats.total_items > 0 {
            stats.average_difficulty = Some(difficulty_sum / f64::from(stats.total_items));
        }
        stats
    }
}

/// Read-only statistics over a learner's collections.
#[derive(Clone)]
pub struct StatisticsService {
    clock: Clock,
    collections: Arc<dyn CollectionRepository>,
    items: Arc<dyn ItemRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl StatisticsService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            collections: Arc::clone(&storage.collections),
            items: Arc::clone(&storage.items),
            progress: Arc::clone(&storage.progress),
        }
    }

    /// # Errors
    ///
    /// Returns `SessionError::CollectionNotFound` if the learner does not own
    /// the collection, `SessionError::StoreUnavailable` on storage failures.
    pub async fn collection_stats(
        &self,
        learner_id: LearnerId,
        collection_id: CollectionId,
    ) -> Result<CollectionStats, SessionError> {
        SessionQueries::owned_collection(self.collections.as_ref(), learner_id, collection_id)
            .await?;
        let now = self.clock.now();
        let candidates = SessionQueries::candidates(
            self.items.as_ref(),
            self.progress.as_ref(),
            learner_id,
            collection_id,
            now,
        )
        .await?;
        Ok(CollectionStats::from_candidates(
            learner_id,
            collection_id,
            &candidates,
            now,
        ))
    }

    /// Stats for every collection the learner owns, ordered by collection ID.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreUnavailable` on storage failures.
    pub async fn all_collection_stats(
        &self,
        learner_id: LearnerId,
    ) -> Result<Vec<CollectionStats>, SessionError> {
        let collections = self.collections.list_collections(learner_id).await?;
        let mut out = Vec::with_capacity(collections.len());
        for collection in collections {
            out.push(self.collection_stats(learner_id, collection.id()).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vocab_core::model::{Collection, ItemDraft, ProgressRecord};
    use vocab_core::time::fixed_now;

    async fn seeded(storage: &Storage) -> Vec<vocab_core::model::ItemId> {
        let collection = Collection::new(
            CollectionId::new(1),
            LearnerId::new(1),
            "Food",
            None,
            fixed_now(),
        )
        .unwrap();
        storage.collections.upsert_collection(&collection).await.unwrap();
        let mut ids = Vec::new();
        for (p, t) in [("pan", "bread"), ("queso", "cheese"), ("leche", "milk")] {
            let draft = ItemDraft::new(collection.id(), p, "", t)
                .validate(fixed_now())
                .unwrap();
            ids.push(storage.items.insert_new_item(draft).await.unwrap().id());
        }
        ids
    }

    #[tokio::test]
    async fn stats_count_unseen_items_as_new() {
        let storage = Storage::in_memory();
        let ids = seeded(&storage).await;
        let now = fixed_now();

        let reviewed = ProgressRecord::from_persisted(
            LearnerId::new(1),
            ids[0],
            1,
            5,
            4,
            2,
            2.0,
            MasteryStage::Review,
            now - Duration::hours(1),
            Some(now),
            Some(now),
            Some(now),
            3_000,
            now,
            now,
        )
        .unwrap();
        storage.progress.put_progress(&reviewed).await.unwrap();

        let svc = StatisticsService::new(Clock::fixed(now), &storage);
        let stats = svc
            .collection_stats(LearnerId::new(1), CollectionId::new(1))
            .await
            .unwrap();

        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.unseen_items, 2);
        assert_eq!(stats.mastery.get(MasteryStage::New), 2);
        assert_eq!(stats.mastery.get(MasteryStage::Review), 1);
        assert_eq!(stats.total_attempts, 5);
        assert_eq!(stats.accuracy, Some(0.8));
        assert_eq!(stats.average_difficulty, Some(4.0 / 3.0));
        assert_eq!(stats.overdue_items, 1);
        assert_eq!(stats.study_time_ms, 3_000);
    }

    #[tokio::test]
    async fn stats_respect_ownership() {
        let storage = Storage::in_memory();
        seeded(&storage).await;
        let svc = StatisticsService::new(Clock::fixed(fixed_now()), &storage);

        let err = svc
            .collection_stats(LearnerId::new(2), CollectionId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CollectionNotFound(_)));
        assert!(svc.all_collection_stats(LearnerId::new(2)).await.unwrap().is_empty());
        assert_eq!(svc.all_collection_stats(LearnerId::new(1)).await.unwrap().len(), 1);
    }
}
