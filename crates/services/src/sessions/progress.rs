use chrono::{DateTime, Utc};
use vocab_core::model::{SessionId, SessionState, SessionTally};

/// Point-in-time view of an in-flight session, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub session_id: SessionId,
    pub state: SessionState,
    pub tally: SessionTally,
    /// Distinct items served so far; only these accept interactions.
    pub served_items: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}
