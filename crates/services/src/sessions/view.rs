use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use storage::repository::{SessionSummaryRepository, StorageError};
use vocab_core::model::{
    CloseReason, CollectionId, Direction, LearnerId, SessionId, SessionSummary,
};

use crate::Clock;
use crate::error::SessionError;

/// Presentation-agnostic list item for a closed session.
///
/// No pre-formatted strings; callers format timestamps and ratios themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionHistoryItem {
    pub session_id: SessionId,
    pub collection_id: CollectionId,
    pub direction: Direction,
    pub closed_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub close_reason: CloseReason,
    pub items_served: u32,
    pub correct_count: u32,
    pub quiz_attempts: u32,
    pub accuracy: Option<f64>,
}

impl SessionHistoryItem {
    #[must_use]
    pub fn from_summary(summary: &SessionSummary) -> Self {
        Self {
            session_id: summary.session_id(),
            collection_id: summary.collection_id(),
            direction: summary.direction(),
            closed_at: summary.closed_at(),
            duration_secs: summary.duration_secs(),
            close_reason: summary.close_reason(),
            items_served: summary.items_served(),
            correct_count: summary.correct_count(),
            quiz_attempts: summary.tally().quiz_attempts,
            accuracy: summary.accuracy(),
        }
    }
}

/// Read side of persisted session summaries.
#[derive(Clone)]
pub struct SessionHistoryService {
    clock: Clock,
    summaries: Arc<dyn SessionSummaryRepository>,
}

impl SessionHistoryService {
    #[must_use]
    pub fn new(clock: Clock, summaries: Arc<dyn SessionSummaryRepository>) -> Self {
        Self { clock, summaries }
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::new(
            clock,
            Arc::new(storage::repository::InMemoryRepository::new()),
        )
    }

    /// Summaries closed within the last `days`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::StoreUnavailable` on repository failures.
    pub async fn list_recent(
        &self,
        learner_id: LearnerId,
        collection_id: Option<CollectionId>,
        days: i64,
        limit: u32,
    ) -> Result<Vec<SessionHistoryItem>, SessionError> {
        let since = self.clock.now() - Duration::days(days.max(0));
        let summaries = self
            .summaries
            .list_summaries(learner_id, collection_id, limit)
            .await?;

        Ok(summaries
            .iter()
            .filter(|s| s.closed_at() >= since)
            .map(SessionHistoryItem::from_summary)
            .collect())
    }

    /// # Errors
    ///
    /// Returns `SessionError::UnknownSession` if no summary was stored for `id`,
    /// `SessionError::StoreUnavailable` on other repository failures.
    pub async fn get_summary(&self, id: SessionId) -> Result<SessionSummary, SessionError> {
        match self.summaries.get_summary(id).await {
            Ok(summary) => Ok(summary),
            Err(StorageError::NotFound) => Err(SessionError::UnknownSession(id)),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use storage::repository::InMemoryRepository;
    use vocab_core::model::SessionTally;
    use vocab_core::time::fixed_now;

    fn summary(closed_days_ago: i64, correct: u32) -> SessionSummary {
        let closed_at = fixed_now() - Duration::days(closed_days_ago);
        let tally = SessionTally {
            items_served: 4,
            quiz_attempts: 4,
            correct_count: correct,
            ..SessionTally::default()
        };
        SessionSummary::from_persisted(
            SessionId::generate(),
            LearnerId::new(1),
            CollectionId::new(1),
            Direction::PromptToTranslation,
            closed_at - Duration::minutes(10),
            closed_at,
            600,
            CloseReason::Explicit,
            tally,
        )
        .unwrap()
    }

    #[test]
    fn history_item_carries_counts() {
        let item = SessionHistoryItem::from_summary(&summary(0, 3));

        assert_eq!(item.items_served, 4);
        assert_eq!(item.correct_count, 3);
        assert_eq!(item.accuracy, Some(0.75));
        assert_eq!(item.close_reason, CloseReason::Explicit);
    }

    #[tokio::test]
    async fn list_recent_drops_summaries_outside_window() {
        let repo = Arc::new(InMemoryRepository::new());
        let recent = summary(1, 2);
        repo.append_summary(&recent).await.unwrap();
        repo.append_summary(&summary(30, 4)).await.unwrap();

        let service = SessionHistoryService::new(Clock::fixed(fixed_now()), repo);
        let items = service
            .list_recent(LearnerId::new(1), None, 7, 10)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].session_id, recent.session_id());
    }

    #[tokio::test]
    async fn missing_summary_is_unknown_session() {
        let service = SessionHistoryService::in_memory(Clock::fixed(fixed_now()));
        let id = SessionId::generate();

        let err = service.get_summary(id).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession(got) if got == id));
    }
}
