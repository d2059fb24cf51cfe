#![forbid(unsafe_code)]

pub mod error;
pub mod progress_service;
pub mod quiz;
pub mod sessions;
pub mod statistics;

pub use vocab_core::Clock;

pub use error::{ProgressServiceError, SessionError};
pub use progress_service::{AppliedInteraction, ProgressService};
pub use quiz::{QuizBuilder, QuizQuestion};
pub use sessions::{
    Candidate, RecordedInteraction, SelectionEngine, SessionCoordinator, SessionHistoryItem,
    SessionHistoryService, SessionProgress, StudySession,
};
pub use statistics::{CollectionStats, MasteryDistribution, StatisticsService};
