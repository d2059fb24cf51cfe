mod plan;
mod progress;
mod queries;
mod service;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use plan::SelectionEngine;
pub use progress::SessionProgress;
pub(crate) use queries::SessionQueries;
pub use queries::Candidate;
pub use service::StudySession;
pub use view::{SessionHistoryItem, SessionHistoryService};
pub use workflow::{RecordedInteraction, SessionCoordinator};
