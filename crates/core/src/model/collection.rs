use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CollectionId, LearnerId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollectionError {
    #[error("collection name cannot be empty")]
    EmptyName,
}

/// A named set of items owned by one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    id: CollectionId,
    owner: LearnerId,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl Collection {
    /// # Errors
    ///
    /// Returns `CollectionError::EmptyName` if the trimmed name is empty.
    pub fn new(
        id: CollectionId,
        owner: LearnerId,
        name: impl Into<String>,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CollectionError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(CollectionError::EmptyName);
        }
        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            owner,
            name,
            description,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> LearnerId {
        self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_owned_by(&self, learner: LearnerId) -> bool {
        self.owner == learner
    }
}
