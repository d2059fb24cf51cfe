use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use storage::repository::{
    CollectionRepository, ItemRepository, ProgressRepository, SessionSummaryRepository, Storage,
    StorageError,
};
use vocab_core::config::EngineConfig;
use vocab_core::model::{
    CloseReason, CollectionId, Direction, Interaction, InteractionRecord, Item, ItemId,
    LearnerId, ProgressRecord, SessionId, SessionSummary,
};
use vocab_core::scheduler::ScheduledReview;

use super::plan::SelectionEngine;
use super::progress::SessionProgress;
use super::queries::SessionQueries;
use super::service::StudySession;
use crate::Clock;
use crate::error::SessionError;
use crate::progress_service::ProgressService;
use crate::quiz::{QuizBuilder, QuizQuestion};

type SessionHandle = Arc<tokio::sync::Mutex<StudySession>>;

/// Result of recording one interaction in a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInteraction {
    pub item_id: ItemId,
    pub record: ProgressRecord,
    pub scheduled: Option<ScheduledReview>,
    pub session: SessionProgress,
}

/// Owns live study sessions and routes their operations to selection,
/// evaluation and storage.
///
/// Operations on one session are serialized; different sessions run
/// concurrently. Progress writes for the same (learner, item) are
/// serialized across sessions by `ProgressService`.
pub struct SessionCoordinator {
    clock: Clock,
    config: EngineConfig,
    collections: Arc<dyn CollectionRepository>,
    items: Arc<dyn ItemRepository>,
    progress_repo: Arc<dyn ProgressRepository>,
    summaries: Arc<dyn SessionSummaryRepository>,
    progress: ProgressService,
    selection: SelectionEngine,
    quiz: QuizBuilder,
    rng: Mutex<StdRng>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionCoordinator {
    /// # Errors
    ///
    /// Returns `SessionError::Config` if `config` does not validate.
    pub fn new(clock: Clock, config: EngineConfig, storage: &Storage) -> Result<Self, SessionError> {
        config.validate()?;
        let rng = match config.selection.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            progress: ProgressService::new(
                &config,
                Arc::clone(&storage.progress),
                Arc::clone(&storage.interaction_writes),
            ),
            selection: SelectionEngine::new(config.selection.clone()),
            quiz: QuizBuilder::new(config.quiz.choices),
            clock,
            config,
            collections: Arc::clone(&storage.collections),
            items: Arc::clone(&storage.items),
            progress_repo: Arc::clone(&storage.progress),
            summaries: Arc::clone(&storage.session_summaries),
            rng: Mutex::new(rng),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn idle_timeout(&self) -> Duration {
        let secs = i64::try_from(self.config.session.idle_timeout_secs).unwrap_or(i64::MAX);
        Duration::try_seconds(secs).unwrap_or(Duration::MAX)
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, id: SessionId) -> Option<SessionHandle> {
        self.registry().get(&id).cloned()
    }

    fn evict(&self, id: SessionId) {
        self.registry().remove(&id);
    }

    /// Number of sessions held in memory (open, or closed with an unpersisted summary).
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.registry().len()
    }

    //
    // ─── OPEN ──────────────────────────────────────────────────────────────────
    //

    /// Open a session for a collection the learner owns.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::CollectionNotFound` if the collection is missing or
    /// not owned by the learner, `SessionError::StoreUnavailable` on storage failures.
    pub async fn open_session(
        &self,
        learner_id: LearnerId,
        collection_id: CollectionId,
        direction: Direction,
    ) -> Result<SessionId, SessionError> {
        SessionQueries::owned_collection(self.collections.as_ref(), learner_id, collection_id)
            .await?;

        let id = SessionId::generate();
        let session =
            StudySession::open(id, learner_id, collection_id, direction, self.clock.now());
        self.registry()
            .insert(id, Arc::new(tokio::sync::Mutex::new(session)));

        info!(session_id = %id, %learner_id, %collection_id, %direction, "session opened");
        Ok(id)
    }

    //
    // ─── SERVE ─────────────────────────────────────────────────────────────────
    //

    /// Select up to `count` items to study next and mark them as served.
    ///
    /// Returns fewer items when the collection is smaller, none when it is empty.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionClosed` after close or idle expiry,
    /// `SessionError::UnknownSession` for unknown IDs, and
    /// `SessionError::StoreUnavailable` on storage failures.
    pub async fn serve_batch(&self, id: SessionId, count: usize) -> Result<Vec<Item>, SessionError> {
        let handle = self.live(id).await?;
        let mut session = handle.lock().await;
        let now = self.clock.now();
        self.expire_stale(&mut session, now).await;
        session.ensure_open()?;

        let candidates = SessionQueries::candidates(
            self.items.as_ref(),
            self.progress_repo.as_ref(),
            session.learner_id(),
            session.collection_id(),
            now,
        )
        .await?;
        let records: Vec<ProgressRecord> =
            candidates.iter().map(|c| c.progress.clone()).collect();

        let picked = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.selection.select(
                &records,
                count,
                self.selection.config().include_overdue,
                now,
                &mut *rng,
            )
        };

        let mut by_id: HashMap<ItemId, Item> = candidates
            .into_iter()
            .map(|c| (c.item.id(), c.item))
            .collect();
        let items: Vec<Item> = picked.iter().filter_map(|id| by_id.remove(id)).collect();

        session.record_batch(&picked, now)?;
        debug!(session_id = %id, requested = count, served = items.len(), "batch served");
        Ok(items)
    }

    /// Serve a batch of the configured default size.
    ///
    /// # Errors
    ///
    /// Same as [`Self::serve_batch`].
    pub async fn serve_default_batch(&self, id: SessionId) -> Result<Vec<Item>, SessionError> {
        let count = usize::try_from(self.config.session.default_batch_size).unwrap_or(usize::MAX);
        self.serve_batch(id, count).await
    }

    //
    // ─── INTERACT ──────────────────────────────────────────────────────────────
    //

    /// Evaluate, schedule and persist one interaction with a served item.
    ///
    /// Session counters change only after the store write succeeds.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionClosed`, `SessionError::UnknownItem` (item not
    /// served in this session), `SessionError::InvalidInteraction` (malformed
    /// outcome), or `SessionError::StoreUnavailable`. Nothing changes on error.
    pub async fn record_interaction(
        &self,
        id: SessionId,
        item_id: ItemId,
        interaction: Interaction,
    ) -> Result<RecordedInteraction, SessionError> {
        let handle = self.live(id).await?;
        let mut session = handle.lock().await;
        let now = self.clock.now();
        self.expire_stale(&mut session, now).await;
        session.ensure_open()?;
        session.ensure_served(item_id)?;
        let outcome = interaction.outcome()?;

        let log = InteractionRecord::new(
            id,
            session.learner_id(),
            item_id,
            session.direction(),
            interaction,
            now,
        );
        let applied = match self.progress.apply(log).await {
            Ok(applied) => applied,
            Err(err) => {
                warn!(session_id = %id, %item_id, error = %err, "interaction not recorded");
                return Err(err.into());
            }
        };

        session.record_outcome(item_id, &outcome, now)?;
        debug!(
            session_id = %id,
            %item_id,
            kind = %interaction.kind,
            stage = %applied.record.mastery_stage(),
            "interaction recorded"
        );

        Ok(RecordedInteraction {
            item_id,
            record: applied.record,
            scheduled: applied.scheduled,
            session: session.progress(),
        })
    }

    /// Multiple-choice question for a served item, in the session's direction.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionClosed`, `SessionError::UnknownItem`, or
    /// `SessionError::StoreUnavailable`.
    pub async fn quiz_question(
        &self,
        id: SessionId,
        item_id: ItemId,
    ) -> Result<QuizQuestion, SessionError> {
        let handle = self.live(id).await?;
        let mut session = handle.lock().await;
        self.expire_stale(&mut session, self.clock.now()).await;
        session.ensure_open()?;
        session.ensure_served(item_id)?;

        let pool = self.items.list_items(session.collection_id()).await?;
        let target = pool
            .iter()
            .find(|item| item.id() == item_id)
            .ok_or(SessionError::UnknownItem(item_id))?;

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self
            .quiz
            .build(target, &pool, session.direction(), &mut *rng))
    }

    /// Current counters of a live session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownSession` if the session is not in memory.
    pub async fn snapshot(&self, id: SessionId) -> Result<SessionProgress, SessionError> {
        let handle = self.handle(id).ok_or(SessionError::UnknownSession(id))?;
        let session = handle.lock().await;
        Ok(session.progress())
    }

    //
    // ─── CLOSE ─────────────────────────────────────────────────────────────────
    //

    /// Close a session and persist its summary.
    ///
    /// Idempotent: later calls return the same summary, including after the
    /// session was evicted from memory. A call after a failed persist retries it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SessionClosed` if `explicit_duration` conflicts with
    /// the recorded one, `SessionError::InvalidDuration` if it is negative,
    /// `SessionError::UnknownSession` for unknown IDs, and
    /// `SessionError::StoreUnavailable` if the summary cannot be stored.
    pub async fn close(
        &self,
        id: SessionId,
        explicit_duration: Option<Duration>,
    ) -> Result<SessionSummary, SessionError> {
        let Some(handle) = self.handle(id) else {
            return self.persisted_summary(id, explicit_duration).await;
        };
        let mut session = handle.lock().await;
        let now = self.clock.now();
        self.expire_if_idle(&mut session, now);

        let summary = session
            .close(explicit_duration, CloseReason::Explicit, now)?
            .clone();

        if !session.summary_persisted() {
            self.persist_summary(&mut session).await?;
            info!(
                session_id = %id,
                items_served = summary.items_served(),
                correct = summary.correct_count(),
                duration_secs = summary.duration_secs(),
                "session closed"
            );
        }
        Ok(summary)
    }

    /// Close every session idle past the timeout, persist pending summaries,
    /// and evict what is done. Returns summaries persisted by this sweep.
    ///
    /// Each pending summary gets one write attempt per sweep.
    pub async fn sweep_idle(&self) -> Vec<SessionSummary> {
        let now = self.clock.now();
        let handles: Vec<SessionHandle> = self.registry().values().cloned().collect();

        let mut persisted = Vec::new();
        for handle in handles {
            let mut session = handle.lock().await;
            self.expire_if_idle(&mut session, now);
            if session.is_closed()
                && !session.summary_persisted()
                && self.persist_summary(&mut session).await.is_ok()
            {
                persisted.extend(session.summary().cloned());
            }
        }
        persisted
    }

    /// Close `session` as timed out at its last activity when idle. Returns
    /// true if this call closed it. Persisting is left to the caller.
    fn expire_if_idle(&self, session: &mut StudySession, now: DateTime<Utc>) -> bool {
        if !session.is_idle(now, self.idle_timeout()) {
            return false;
        }
        let closed_at = session.last_activity_at();
        let closed = session
            .close(None, CloseReason::TimedOut, closed_at)
            .map(|_| ());
        if let Err(err) = closed {
            warn!(session_id = %session.id(), error = %err, "idle session could not be closed");
            return false;
        }
        info!(session_id = %session.id(), "session expired after inactivity");
        true
    }

    /// Expire an idle session and try once to store its summary. A failed
    /// write is logged and left for the next close or sweep.
    async fn expire_stale(&self, session: &mut StudySession, now: DateTime<Utc>) {
        if self.expire_if_idle(session, now) {
            let _ = self.persist_summary(session).await;
        }
    }

    async fn persist_summary(&self, session: &mut StudySession) -> Result<(), SessionError> {
        let Some(summary) = session.summary() else {
            return Ok(());
        };
        match self.summaries.append_summary(summary).await {
            Ok(()) => {
                session.mark_summary_persisted();
                self.evict(session.id());
                Ok(())
            }
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "session summary not persisted");
                Err(err.into())
            }
        }
    }

    async fn persisted_summary(
        &self,
        id: SessionId,
        explicit_duration: Option<Duration>,
    ) -> Result<SessionSummary, SessionError> {
        match self.summaries.get_summary(id).await {
            Ok(summary) => {
                if explicit_duration.is_some_and(|d| d.num_seconds() != summary.duration_secs()) {
                    return Err(SessionError::SessionClosed);
                }
                Ok(summary)
            }
            Err(StorageError::NotFound) => Err(SessionError::UnknownSession(id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Handle of a live session. An ID with no live session is closed if a
    /// summary exists for it, unknown otherwise.
    async fn live(&self, id: SessionId) -> Result<SessionHandle, SessionError> {
        if let Some(handle) = self.handle(id) {
            return Ok(handle);
        }
        match self.summaries.get_summary(id).await {
            Ok(_) => Err(SessionError::SessionClosed),
            Err(StorageError::NotFound) => Err(SessionError::UnknownSession(id)),
            Err(err) => Err(SessionError::StoreUnavailable(err)),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use storage::repository::{InMemoryRepository, InteractionPersistence};
    use vocab_core::model::{Collection, InteractionKind, ItemDraft, MasteryStage, SessionState};
    use vocab_core::time::fixed_now;

    const LEARNER: LearnerId = LearnerId::new(1);
    const COLLECTION: CollectionId = CollectionId::new(1);

    async fn seeded_storage(items: usize) -> Storage {
        let storage = Storage::in_memory();
        let collection = Collection::new(COLLECTION, LEARNER, "Spanish", None, fixed_now()).unwrap();
        storage.collections.upsert_collection(&collection).await.unwrap();
        for n in 0..items {
            let draft = ItemDraft::new(COLLECTION, format!("palabra {n}"), "", format!("word {n}"));
            storage
                .items
                .insert_new_item(draft.validate(fixed_now()).unwrap())
                .await
                .unwrap();
        }
        storage
    }

    fn seeded_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.selection.seed = Some(7);
        config
    }

    async fn coordinator(clock: Clock, items: usize) -> (SessionCoordinator, Storage) {
        let storage = seeded_storage(items).await;
        let coordinator = SessionCoordinator::new(clock, seeded_config(), &storage).unwrap();
        (coordinator, storage)
    }

    #[tokio::test]
    async fn open_requires_owned_collection() {
        let (coordinator, _) = coordinator(Clock::fixed(fixed_now()), 1).await;

        let err = coordinator
            .open_session(LearnerId::new(2), COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CollectionNotFound(id) if id == COLLECTION));

        let err = coordinator
            .open_session(LEARNER, CollectionId::new(99), Direction::PromptToTranslation)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn serve_batch_is_bounded_by_collection_size() {
        let (coordinator, _) = coordinator(Clock::fixed(fixed_now()), 3).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();

        let items = coordinator.serve_batch(id, 10).await.unwrap();
        let mut ids: Vec<ItemId> = items.iter().map(Item::id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);

        let snapshot = coordinator.snapshot(id).await.unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.served_items, 3);
        assert_eq!(snapshot.tally.batches_served, 1);
    }

    #[tokio::test]
    async fn empty_collection_serves_nothing() {
        let (coordinator, _) = coordinator(Clock::fixed(fixed_now()), 0).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::TranslationToPrompt)
            .await
            .unwrap();

        assert!(coordinator.serve_batch(id, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interaction_with_unserved_item_is_rejected() {
        let (coordinator, storage) = coordinator(Clock::fixed(fixed_now()), 2).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();

        let err = coordinator
            .record_interaction(id, ItemId::new(1), Interaction::quiz(true, Some(1_000)))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownItem(_)));
        assert!(
            storage
                .progress
                .get_progress(LEARNER, ItemId::new(1))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(coordinator.snapshot(id).await.unwrap().tally.items_served, 0);
    }

    #[tokio::test]
    async fn malformed_interaction_changes_nothing() {
        let (coordinator, storage) = coordinator(Clock::fixed(fixed_now()), 1).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        let item = coordinator.serve_batch(id, 1).await.unwrap()[0].id();

        let raw = Interaction {
            kind: InteractionKind::Quiz,
            correct: None,
            response_time_ms: Some(900),
        };
        let err = coordinator.record_interaction(id, item, raw).await.unwrap_err();

        assert!(matches!(err, SessionError::InvalidInteraction(_)));
        assert!(storage.interactions.interactions_for_session(id).await.unwrap().is_empty());
        assert_eq!(coordinator.snapshot(id).await.unwrap().tally.items_served, 0);
    }

    #[tokio::test]
    async fn quiz_answer_updates_progress_and_tally() {
        let (coordinator, storage) = coordinator(Clock::fixed(fixed_now()), 2).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        let item = coordinator.serve_batch(id, 1).await.unwrap()[0].id();

        let result = coordinator
            .record_interaction(id, item, Interaction::quiz(true, Some(1_500)))
            .await
            .unwrap();

        assert_eq!(result.record.quiz_attempts(), 1);
        assert_eq!(result.record.mastery_stage(), MasteryStage::New);
        assert!(result.scheduled.is_some());
        assert_eq!(result.session.tally.correct_count, 1);
        assert_eq!(result.session.tally.unique_items, 1);

        let stored = storage.progress.get_progress(LEARNER, item).await.unwrap().unwrap();
        assert_eq!(stored, result.record);
        assert_eq!(storage.interactions.interactions_for_session(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_further_use() {
        let (coordinator, storage) = coordinator(Clock::fixed(fixed_now()), 2).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        let item = coordinator.serve_batch(id, 1).await.unwrap()[0].id();
        coordinator
            .record_interaction(id, item, Interaction::exposure(Some(3_000)))
            .await
            .unwrap();

        let first = coordinator
            .close(id, Some(Duration::seconds(90)))
            .await
            .unwrap();
        assert_eq!(first.duration_secs(), 90);
        assert_eq!(first.tally().exposures, 1);
        assert_eq!(coordinator.live_sessions(), 0);
        assert_eq!(storage.session_summaries.get_summary(id).await.unwrap(), first);

        let again = coordinator.close(id, None).await.unwrap();
        assert_eq!(again, first);

        let err = coordinator
            .close(id, Some(Duration::seconds(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionClosed));

        let err = coordinator.serve_batch(id, 1).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionClosed));
        let err = coordinator
            .record_interaction(id, item, Interaction::exposure(None))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionClosed));
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let (coordinator, _) = coordinator(Clock::fixed(fixed_now()), 1).await;
        let id = SessionId::generate();

        assert!(matches!(
            coordinator.serve_batch(id, 1).await.unwrap_err(),
            SessionError::UnknownSession(got) if got == id
        ));
        assert!(matches!(
            coordinator.close(id, None).await.unwrap_err(),
            SessionError::UnknownSession(_)
        ));
    }

    #[tokio::test]
    async fn idle_session_times_out_at_last_activity() {
        let mut clock = Clock::manual(fixed_now());
        let (coordinator, storage) = coordinator(clock.clone(), 2).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        let item = coordinator.serve_batch(id, 1).await.unwrap()[0].id();

        clock.advance(Duration::minutes(5));
        coordinator
            .record_interaction(id, item, Interaction::quiz(false, None))
            .await
            .unwrap();
        clock.advance(Duration::minutes(31));

        let err = coordinator
            .record_interaction(id, item, Interaction::quiz(true, None))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionClosed));

        let summary = storage.session_summaries.get_summary(id).await.unwrap();
        assert_eq!(summary.close_reason(), CloseReason::TimedOut);
        assert_eq!(summary.closed_at(), fixed_now() + Duration::minutes(5));
        assert_eq!(summary.duration_secs(), 300);
        assert_eq!(summary.tally().quiz_attempts, 1);
    }

    #[tokio::test]
    async fn sweep_closes_only_idle_sessions() {
        let mut clock = Clock::manual(fixed_now());
        let (coordinator, _) = coordinator(clock.clone(), 2).await;
        let stale = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        clock.advance(Duration::minutes(20));
        let fresh = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        clock.advance(Duration::minutes(15));

        let closed = coordinator.sweep_idle().await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].session_id(), stale);
        assert_eq!(coordinator.live_sessions(), 1);
        assert!(coordinator.snapshot(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn quiz_question_expires_idle_session() {
        let mut clock = Clock::manual(fixed_now());
        let (coordinator, storage) = coordinator(clock.clone(), 4).await;
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        let item = coordinator.serve_batch(id, 1).await.unwrap()[0].id();
        assert!(coordinator.quiz_question(id, item).await.is_ok());

        clock.advance(Duration::minutes(31));

        let err = coordinator.quiz_question(id, item).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionClosed));
        let summary = storage.session_summaries.get_summary(id).await.unwrap();
        assert_eq!(summary.close_reason(), CloseReason::TimedOut);
        assert_eq!(coordinator.live_sessions(), 0);
    }

    struct FailingWrites;

    #[async_trait]
    impl InteractionPersistence for FailingWrites {
        async fn apply_interaction(
            &self,
            _progress: &ProgressRecord,
            _log: InteractionRecord,
        ) -> Result<i64, StorageError> {
            Err(StorageError::Connection("disk full".into()))
        }
    }

    #[tokio::test]
    async fn failed_interaction_write_leaves_session_counters_alone() {
        let mut storage = seeded_storage(2).await;
        storage.interaction_writes = Arc::new(FailingWrites);
        let coordinator =
            SessionCoordinator::new(Clock::fixed(fixed_now()), seeded_config(), &storage).unwrap();
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        let item = coordinator.serve_batch(id, 1).await.unwrap()[0].id();

        let err = coordinator
            .record_interaction(id, item, Interaction::quiz(true, Some(1_200)))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));

        let snapshot = coordinator.snapshot(id).await.unwrap();
        assert_eq!(snapshot.tally.items_served, 0);
        assert_eq!(snapshot.tally.unique_items, 0);
        assert_eq!(snapshot.tally.correct_count, 0);
        assert_eq!(snapshot.tally.quiz_attempts, 0);
        assert!(storage.progress.get_progress(LEARNER, item).await.unwrap().is_none());
    }

    struct FlakySummaries {
        inner: InMemoryRepository,
        failing: AtomicBool,
        attempts: AtomicUsize,
    }

    impl FlakySummaries {
        fn failing() -> Self {
            Self {
                inner: InMemoryRepository::new(),
                failing: AtomicBool::new(true),
                attempts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionSummaryRepository for FlakySummaries {
        async fn append_summary(&self, summary: &SessionSummary) -> Result<(), StorageError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Connection("offline".into()));
            }
            self.inner.append_summary(summary).await
        }

        async fn get_summary(&self, session_id: SessionId) -> Result<SessionSummary, StorageError> {
            self.inner.get_summary(session_id).await
        }

        async fn list_summaries(
            &self,
            learner_id: LearnerId,
            collection_id: Option<CollectionId>,
            limit: u32,
        ) -> Result<Vec<SessionSummary>, StorageError> {
            self.inner
                .list_summaries(learner_id, collection_id, limit)
                .await
        }
    }

    #[tokio::test]
    async fn failed_summary_write_is_retried_on_next_close() {
        let mut storage = seeded_storage(1).await;
        let summaries = Arc::new(FlakySummaries::failing());
        storage.session_summaries = Arc::clone(&summaries) as Arc<dyn SessionSummaryRepository>;
        let coordinator =
            SessionCoordinator::new(Clock::fixed(fixed_now()), seeded_config(), &storage).unwrap();
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();

        let err = coordinator.close(id, None).await.unwrap_err();
        assert!(matches!(err, SessionError::StoreUnavailable(_)));
        assert_eq!(coordinator.live_sessions(), 1);

        summaries.failing.store(false, Ordering::SeqCst);
        let summary = coordinator.close(id, None).await.unwrap();
        assert_eq!(summaries.inner.get_summary(id).await.unwrap(), summary);
        assert_eq!(coordinator.live_sessions(), 0);
    }

    #[tokio::test]
    async fn sweep_makes_one_summary_write_per_pending_session() {
        let mut clock = Clock::manual(fixed_now());
        let mut storage = seeded_storage(1).await;
        let summaries = Arc::new(FlakySummaries::failing());
        storage.session_summaries = Arc::clone(&summaries) as Arc<dyn SessionSummaryRepository>;
        let coordinator =
            SessionCoordinator::new(clock.clone(), seeded_config(), &storage).unwrap();
        let id = coordinator
            .open_session(LEARNER, COLLECTION, Direction::PromptToTranslation)
            .await
            .unwrap();
        clock.advance(Duration::minutes(45));

        assert!(coordinator.sweep_idle().await.is_empty());
        assert_eq!(summaries.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.live_sessions(), 1);

        assert!(coordinator.sweep_idle().await.is_empty());
        assert_eq!(summaries.attempts.load(Ordering::SeqCst), 2);

        summaries.failing.store(false, Ordering::SeqCst);
        let persisted = coordinator.sweep_idle().await;
        assert_eq!(summaries.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].session_id(), id);
        assert_eq!(persisted[0].close_reason(), CloseReason::TimedOut);
        assert_eq!(coordinator.live_sessions(), 0);
    }
}
