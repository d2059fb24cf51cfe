use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use vocab_core::model::{
    Collection, CollectionId, InteractionRecord, Item, ItemId, LearnerId, ProgressRecord,
    SessionId, SessionSummary, ValidatedItem,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait CollectionRepository: Send + Sync {
    /// Persist or update a collection.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the collection cannot be stored.
    async fn upsert_collection(&self, collection: &Collection) -> Result<(), StorageError>;

    /// Fetch a collection by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_collection(&self, id: CollectionId) -> Result<Collection, StorageError>;

    /// Collections owned by a learner, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_collections(&self, owner: LearnerId) -> Result<Vec<Collection>, StorageError>;
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Insert a validated item and let the backend assign its ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn insert_new_item(&self, item: ValidatedItem) -> Result<Item, StorageError>;

    /// Fetch items of a collection by IDs, in the order requested.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any are missing, or other storage errors.
    async fn get_items(
        &self,
        collection_id: CollectionId,
        ids: &[ItemId],
    ) -> Result<Vec<Item>, StorageError>;

    /// All items of a collection, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_items(&self, collection_id: CollectionId) -> Result<Vec<Item>, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Stored progress for one (learner, item) pair; `None` if never interacted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        item_id: ItemId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Insert or replace a progress record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn put_progress(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Stored records for the given items. Items without history are omitted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn progress_for_items(
        &self,
        learner_id: LearnerId,
        item_ids: &[ItemId],
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

#[async_trait]
pub trait InteractionLogRepository: Send + Sync {
    /// Log entries of one session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn interactions_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<InteractionRecord>, StorageError>;
}

/// Atomic write of an interaction log entry plus the progress it produced.
#[async_trait]
pub trait InteractionPersistence: Send + Sync {
    /// Append `log`, then store `progress`, as one unit. Returns the log ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if `log` and `progress` disagree on
    /// learner or item, or other storage errors. Nothing is written on error.
    async fn apply_interaction(
        &self,
        progress: &ProgressRecord,
        log: InteractionRecord,
    ) -> Result<i64, StorageError>;
}

#[async_trait]
pub trait SessionSummaryRepository: Send + Sync {
    /// Store a closed session's summary, keyed by session ID.
    ///
    /// Re-appending an identical summary is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a different summary exists for the
    /// same session, or other storage errors.
    async fn append_summary(&self, summary: &SessionSummary) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no summary exists for the session.
    async fn get_summary(&self, session_id: SessionId) -> Result<SessionSummary, StorageError>;

    /// Most recent summaries for a learner, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failure.
    async fn list_summaries(
        &self,
        learner_id: LearnerId,
        collection_id: Option<CollectionId>,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError>;
}

fn check_log_matches(progress: &ProgressRecord, log: &InteractionRecord) -> Result<(), StorageError> {
    if log.learner_id != progress.learner_id() || log.item_id != progress.item_id() {
        return Err(StorageError::Conflict);
    }
    Ok(())
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    collections: Arc<Mutex<HashMap<CollectionId, Collection>>>,
    items: Arc<Mutex<HashMap<ItemId, Item>>>,
    progress: Arc<Mutex<HashMap<(LearnerId, ItemId), ProgressRecord>>>,
    interactions: Arc<Mutex<Vec<InteractionRecord>>>,
    summaries: Arc<Mutex<HashMap<SessionId, SessionSummary>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl CollectionRepository for InMemoryRepository {
    async fn upsert_collection(&self, collection: &Collection) -> Result<(), StorageError> {
        let mut guard = self.collections.lock().map_err(poisoned)?;
        guard.insert(collection.id(), collection.clone());
        Ok(())
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Collection, StorageError> {
        let guard = self.collections.lock().map_err(poisoned)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_collections(&self, owner: LearnerId) -> Result<Vec<Collection>, StorageError> {
        let guard = self.collections.lock().map_err(poisoned)?;
        let mut out: Vec<Collection> = guard
            .values()
            .filter(|c| c.is_owned_by(owner))
            .cloned()
            .collect();
        out.sort_by_key(Collection::id);
        Ok(out)
    }
}

#[async_trait]
impl ItemRepository for InMemoryRepository {
    async fn insert_new_item(&self, item: ValidatedItem) -> Result<Item, StorageError> {
        let mut guard = self.items.lock().map_err(poisoned)?;
        let next = guard.keys().map(|id| id.value()).max().unwrap_or(0) + 1;
        let item = item.assign_id(ItemId::new(next));
        guard.insert(item.id(), item.clone());
        Ok(item)
    }

    async fn get_items(
        &self,
        collection_id: CollectionId,
        ids: &[ItemId],
    ) -> Result<Vec<Item>, StorageError> {
        let guard = self.items.lock().map_err(poisoned)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match guard.get(id) {
                Some(item) if item.collection_id() == collection_id => found.push(item.clone()),
                _ => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }

    async fn list_items(&self, collection_id: CollectionId) -> Result<Vec<Item>, StorageError> {
        let guard = self.items.lock().map_err(poisoned)?;
        let mut out: Vec<Item> = guard
            .values()
            .filter(|item| item.collection_id() == collection_id)
            .cloned()
            .collect();
        out.sort_by_key(Item::id);
        Ok(out)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        learner_id: LearnerId,
        item_id: ItemId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(learner_id, item_id)).cloned())
    }

    async fn put_progress(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert((record.learner_id(), record.item_id()), record.clone());
        Ok(())
    }

    async fn progress_for_items(
        &self,
        learner_id: LearnerId,
        item_ids: &[ItemId],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(item_ids
            .iter()
            .filter_map(|id| guard.get(&(learner_id, *id)).cloned())
            .collect())
    }
}

#[async_trait]
impl InteractionLogRepository for InMemoryRepository {
    async fn interactions_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<InteractionRecord>, StorageError> {
        let guard = self.interactions.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InteractionPersistence for InMemoryRepository {
    async fn apply_interaction(
        &self,
        progress: &ProgressRecord,
        mut log: InteractionRecord,
    ) -> Result<i64, StorageError> {
        check_log_matches(progress, &log)?;

        let mut progress_guard = self.progress.lock().map_err(poisoned)?;
        let mut log_guard = self.interactions.lock().map_err(poisoned)?;

        let id = i64::try_from(log_guard.len() + 1)
            .map_err(|_| StorageError::Serialization("interaction id overflow".into()))?;
        log.id = Some(id);
        log_guard.push(log);
        progress_guard.insert((progress.learner_id(), progress.item_id()), progress.clone());
        Ok(id)
    }
}

#[async_trait]
impl SessionSummaryRepository for InMemoryRepository {
    async fn append_summary(&self, summary: &SessionSummary) -> Result<(), StorageError> {
        let mut guard = self.summaries.lock().map_err(poisoned)?;
        match guard.get(&summary.session_id()) {
            Some(existing) if existing == summary => Ok(()),
            Some(_) => Err(StorageError::Conflict),
            None => {
                guard.insert(summary.session_id(), summary.clone());
                Ok(())
            }
        }
    }

    async fn get_summary(&self, session_id: SessionId) -> Result<SessionSummary, StorageError> {
        let guard = self.summaries.lock().map_err(poisoned)?;
        guard.get(&session_id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_summaries(
        &self,
        learner_id: LearnerId,
        collection_id: Option<CollectionId>,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let guard = self.summaries.lock().map_err(poisoned)?;
        let mut out: Vec<SessionSummary> = guard
            .values()
            .filter(|s| s.learner_id() == learner_id)
            .filter(|s| collection_id.is_none_or(|c| s.collection_id() == c))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.closed_at().cmp(&a.closed_at()));
        out.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(out)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub collections: Arc<dyn CollectionRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub interactions: Arc<dyn InteractionLogRepository>,
    pub interaction_writes: Arc<dyn InteractionPersistence>,
    pub session_summaries: Arc<dyn SessionSummaryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every contract to one backend value.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: CollectionRepository
            + ItemRepository
            + ProgressRepository
            + InteractionLogRepository
            + InteractionPersistence
            + SessionSummaryRepository
            + Clone
            + 'static,
    {
        Self {
            collections: Arc::new(repo.clone()),
            items: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            interactions: Arc::new(repo.clone()),
            interaction_writes: Arc::new(repo.clone()),
            session_summaries: Arc::new(repo),
        }
    }
}
