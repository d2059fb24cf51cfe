use std::collections::HashMap;

use chrono::{DateTime, Utc};

use storage::repository::{CollectionRepository, ItemRepository, ProgressRepository, StorageError};
use vocab_core::model::{Collection, CollectionId, Item, LearnerId, ProgressRecord};

use crate::error::SessionError;

/// An item together with the learner's progress on it (stored or unseen default).
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item: Item,
    pub progress: ProgressRecord,
}

/// Storage-backed lookups shared by the session and statistics services.
pub(crate) struct SessionQueries;

impl SessionQueries {
    /// Fetch a collection the learner owns.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::CollectionNotFound` when the collection is missing
    /// or owned by someone else, `SessionError::StoreUnavailable` otherwise.
    pub async fn owned_collection(
        collections: &dyn CollectionRepository,
        learner_id: LearnerId,
        collection_id: CollectionId,
    ) -> Result<Collection, SessionError> {
        match collections.get_collection(collection_id).await {
            Ok(c) if c.is_owned_by(learner_id) => Ok(c),
            Ok(_) | Err(StorageError::NotFound) => {
                Err(SessionError::CollectionNotFound(collection_id))
            }
            Err(e) => Err(SessionError::StoreUnavailable(e)),
        }
    }

    /// Every item in the collection paired with its progress, ordered by item ID.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreUnavailable` when repository access fails.
    pub async fn candidates(
        items: &dyn ItemRepository,
        progress: &dyn ProgressRepository,
        learner_id: LearnerId,
        collection_id: CollectionId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candidate>, SessionError> {
        let items = items.list_items(collection_id).await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = items.iter().map(Item::id).collect();
        let mut stored: HashMap<_, _> = progress
            .progress_for_items(learner_id, &ids)
            .await?
            .into_iter()
            .map(|record| (record.item_id(), record))
            .collect();

        Ok(items
            .into_iter()
            .map(|item| {
                let progress = stored
                    .remove(&item.id())
                    .unwrap_or_else(|| ProgressRecord::unseen(learner_id, item.id(), now));
                Candidate { item, progress }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;
    use vocab_core::model::{ItemDraft, MasteryStage};
    use vocab_core::time::fixed_now;

    async fn seeded() -> (InMemoryRepository, Collection) {
        let repo = InMemoryRepository::new();
        let collection = Collection::new(
            CollectionId::new(1),
            LearnerId::new(1),
            "Verbs",
            None,
            fixed_now(),
        )
        .unwrap();
        repo.upsert_collection(&collection).await.unwrap();
        for (p, t) in [("comer", "eat"), ("beber", "drink")] {
            let draft = ItemDraft::new(collection.id(), p, "", t)
                .validate(fixed_now())
                .unwrap();
            repo.insert_new_item(draft).await.unwrap();
        }
        (repo, collection)
    }

    #[tokio::test]
    async fn foreign_collection_looks_missing() {
        let (repo, collection) = seeded().await;
        let err = SessionQueries::owned_collection(&repo, LearnerId::new(2), collection.id())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CollectionNotFound(id) if id == collection.id()));

        let err = SessionQueries::owned_collection(&repo, LearnerId::new(1), CollectionId::new(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn unseen_items_get_default_progress() {
        let (repo, collection) = seeded().await;
        let now = fixed_now();
        let candidates =
            SessionQueries::candidates(&repo, &repo, LearnerId::new(1), collection.id(), now)
                .await
                .unwrap();

        assert_eq!(candidates.len(), 2);
        for c in &candidates {
            assert_eq!(c.progress.mastery_stage(), MasteryStage::New);
            assert_eq!(c.progress.difficulty_score(), 1.0);
            assert_eq!(c.progress.next_review_at(), now);
            assert_eq!(c.progress.item_id(), c.item.id());
        }
    }
}
