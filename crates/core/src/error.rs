use thiserror::Error;

use crate::config::ConfigError;
use crate::model::{
    CollectionError, InteractionError, ItemError, ProgressError, SessionSummaryError,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    SessionSummary(#[from] SessionSummaryError),
}
