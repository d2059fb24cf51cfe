//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use vocab_core::config::ConfigError;
use vocab_core::model::{CollectionId, InteractionError, ItemId, SessionId, SessionSummaryError};

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("invalid interaction: {0}")]
    InvalidInteraction(#[from] InteractionError),
    #[error("item {0} was not served in this session")]
    UnknownItem(ItemId),
    #[error("session is closed")]
    SessionClosed,
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),
    #[error("collection {0} not found")]
    CollectionNotFound(CollectionId),
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("invalid session duration: {0}s")]
    InvalidDuration(i64),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Summary(#[from] SessionSummaryError),
}

impl From<ProgressServiceError> for SessionError {
    fn from(err: ProgressServiceError) -> Self {
        match err {
            ProgressServiceError::Interaction(e) => SessionError::InvalidInteraction(e),
            ProgressServiceError::Storage(e) => SessionError::StoreUnavailable(e),
        }
    }
}
