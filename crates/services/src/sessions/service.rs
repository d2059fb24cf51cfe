use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use vocab_core::model::{
    CloseReason, CollectionId, Direction, ItemId, LearnerId, Outcome, SessionId, SessionState,
    SessionSummary, SessionTally,
};

use super::progress::SessionProgress;
use crate::error::SessionError;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory state of one study session.
///
/// `Open` until the first batch is served, then `Active`; `Closed` is terminal
/// and freezes the summary.
#[derive(Debug, Clone)]
pub struct StudySession {
    id: SessionId,
    learner_id: LearnerId,
    collection_id: CollectionId,
    direction: Direction,
    state: SessionState,
    started_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    served: HashSet<ItemId>,
    touched: HashSet<ItemId>,
    tally: SessionTally,
    summary: Option<SessionSummary>,
    summary_persisted: bool,
}

impl StudySession {
    #[must_use]
    pub fn open(
        id: SessionId,
        learner_id: LearnerId,
        collection_id: CollectionId,
        direction: Direction,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            learner_id,
            collection_id,
            direction,
            state: SessionState::Open,
            started_at,
            last_activity_at: started_at,
            served: HashSet::new(),
            touched: HashSet::new(),
            tally: SessionTally::default(),
            summary: None,
            summary_persisted: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    #[must_use]
    pub fn tally(&self) -> &SessionTally {
        &self.tally
    }

    #[must_use]
    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    #[must_use]
    pub fn has_served(&self, item_id: ItemId) -> bool {
        self.served.contains(&item_id)
    }

    #[must_use]
    pub fn summary_persisted(&self) -> bool {
        self.summary_persisted
    }

    /// True when the session is still open and nothing happened for `timeout`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        !self.is_closed() && now - self.last_activity_at >= timeout
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            session_id: self.id,
            state: self.state,
            tally: self.tally,
            served_items: self.served.len(),
            started_at: self.started_at,
            last_activity_at: self.last_activity_at,
        }
    }

    /// # Errors
    ///
    /// Returns `SessionError::SessionClosed` once the session is closed.
    pub fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::UnknownItem` if the item was never served here.
    pub fn ensure_served(&self, item_id: ItemId) -> Result<(), SessionError> {
        if !self.has_served(item_id) {
            return Err(SessionError::UnknownItem(item_id));
        }
        Ok(())
    }

    pub(crate) fn record_batch(
        &mut self,
        items: &[ItemId],
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.state = SessionState::Active;
        self.served.extend(items.iter().copied());
        self.tally.batches_served = self.tally.batches_served.saturating_add(1);
        let presented = u32::try_from(items.len()).unwrap_or(u32::MAX);
        self.tally.items_presented = self.tally.items_presented.saturating_add(presented);
        self.last_activity_at = now;
        Ok(())
    }

    /// Count an accepted interaction. Call only after the store write succeeded.
    pub(crate) fn record_outcome(
        &mut self,
        item_id: ItemId,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.ensure_served(item_id)?;
        self.state = SessionState::Active;

        let tally = &mut self.tally;
        tally.items_served = tally.items_served.saturating_add(1);
        match outcome {
            Outcome::Exposure { .. } => {
                tally.exposures = tally.exposures.saturating_add(1);
            }
            Outcome::Quiz {
                correct,
                response_ms,
            } => {
                tally.quiz_attempts = tally.quiz_attempts.saturating_add(1);
                if *correct {
                    tally.correct_count = tally.correct_count.saturating_add(1);
                }
                if let Some(ms) = response_ms {
                    tally.quiz_response_ms_total = tally.quiz_response_ms_total.saturating_add(*ms);
                    tally.quiz_response_samples = tally.quiz_response_samples.saturating_add(1);
                }
            }
        }
        if self.touched.insert(item_id) {
            self.tally.unique_items = self.tally.unique_items.saturating_add(1);
        }
        self.last_activity_at = now;
        Ok(())
    }

    /// Close the session, or return the existing summary if already closed.
    ///
    /// Without an explicit duration, the duration is `closed_at - started_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidDuration` for a negative explicit duration and
    /// `SessionError::SessionClosed` if an explicit duration conflicts with the
    /// one already recorded.
    pub(crate) fn close(
        &mut self,
        explicit: Option<Duration>,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    ) -> Result<&SessionSummary, SessionError> {
        if let Some(existing) = self.summary.take() {
            let conflicting = explicit.is_some_and(|d| d.num_seconds() != existing.duration_secs());
            let summary = self.summary.insert(existing);
            if conflicting {
                return Err(SessionError::SessionClosed);
            }
            return Ok(&*summary);
        }

        let closed_at = closed_at.max(self.started_at);
        let duration_secs = match explicit {
            Some(d) if d.num_seconds() < 0 => {
                return Err(SessionError::InvalidDuration(d.num_seconds()));
            }
            Some(d) => d.num_seconds(),
            None => (closed_at - self.started_at).num_seconds(),
        };

        let summary = SessionSummary::from_persisted(
            self.id,
            self.learner_id,
            self.collection_id,
            self.direction,
            self.started_at,
            closed_at,
            duration_secs,
            reason,
            self.tally,
        )?;

        self.state = SessionState::Closed;
        Ok(&*self.summary.insert(summary))
    }

    pub(crate) fn mark_summary_persisted(&mut self) {
        self.summary_persisted = true;
    }
}
