use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CollectionId, ItemId};
use crate::model::session::Direction;

/// Upper bound on any single text field, counted in characters.
pub const MAX_ITEM_TEXT_CHARS: usize = 1_000;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ItemError {
    #[error("prompt text cannot be empty")]
    EmptyPrompt,

    #[error("translation text cannot be empty")]
    EmptyTranslation,

    #[error("{field} is too long: {len} characters (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated item content as supplied by an editor or importer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub collection_id: CollectionId,
    pub prompt: String,
    pub aid: String,
    pub translation: String,
}

impl ItemDraft {
    #[must_use]
    pub fn new(
        collection_id: CollectionId,
        prompt: impl Into<String>,
        aid: impl Into<String>,
        translation: impl Into<String>,
    ) -> Self {
        Self {
            collection_id,
            prompt: prompt.into(),
            aid: aid.into(),
            translation: translation.into(),
        }
    }

    /// Trim and check the draft.
    ///
    /// The pronunciation aid may be empty; prompt and translation may not.
    ///
    /// # Errors
    ///
    /// Returns `ItemError` if a required field is blank or any field is too long.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedItem, ItemError> {
        let prompt = normalize("prompt", &self.prompt)?;
        let aid = normalize("aid", &self.aid)?;
        let translation = normalize("translation", &self.translation)?;

        if prompt.is_empty() {
            return Err(ItemError::EmptyPrompt);
        }
        if translation.is_empty() {
            return Err(ItemError::EmptyTranslation);
        }

        Ok(ValidatedItem {
            collection_id: self.collection_id,
            prompt,
            aid,
            translation,
            created_at: now,
        })
    }
}

fn normalize(field: &'static str, raw: &str) -> Result<String, ItemError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len > MAX_ITEM_TEXT_CHARS {
        return Err(ItemError::TooLong {
            field,
            len,
            max: MAX_ITEM_TEXT_CHARS,
        });
    }
    Ok(trimmed.to_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedItem {
    collection_id: CollectionId,
    prompt: String,
    aid: String,
    translation: String,
    created_at: DateTime<Utc>,
}

impl ValidatedItem {
    #[must_use]
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn aid(&self) -> &str {
        &self.aid
    }

    #[must_use]
    pub fn translation(&self) -> &str {
        &self.translation
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn assign_id(self, id: ItemId) -> Item {
        Item {
            id,
            collection_id: self.collection_id,
            prompt: self.prompt,
            aid: self.aid,
            translation: self.translation,
            created_at: self.created_at,
        }
    }
}

//
// ─── ITEM ──────────────────────────────────────────────────────────────────────
//

/// Immutable vocabulary unit: the prompt form, a pronunciation aid, and a translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    collection_id: CollectionId,
    prompt: String,
    aid: String,
    translation: String,
    created_at: DateTime<Utc>,
}

impl Item {
    /// Rehydrate an item from storage, re-running draft validation.
    ///
    /// # Errors
    ///
    /// Returns `ItemError` if persisted text no longer satisfies validation.
    pub fn from_persisted(
        id: ItemId,
        collection_id: CollectionId,
        prompt: String,
        aid: String,
        translation: String,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ItemError> {
        Ok(ItemDraft {
            collection_id,
            prompt,
            aid,
            translation,
        }
        .validate(created_at)?
        .assign_id(id))
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn collection_id(&self) -> CollectionId {
        self.collection_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn aid(&self) -> &str {
        &self.aid
    }

    #[must_use]
    pub fn translation(&self) -> &str {
        &self.translation
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Prompt text with its pronunciation aid, e.g. `你好 (nǐ hǎo)`.
    #[must_use]
    pub fn prompt_with_aid(&self) -> String {
        if self.aid.is_empty() {
            self.prompt.clone()
        } else {
            format!("{} ({})", self.prompt, self.aid)
        }
    }

    /// The side shown to the learner for the given direction.
    #[must_use]
    pub fn question_side(&self, direction: Direction) -> String {
        match direction {
            Direction::PromptToTranslation => self.prompt_with_aid(),
            Direction::TranslationToPrompt => self.translation.clone(),
        }
    }

    /// The side the learner is expected to recall for the given direction.
    #[must_use]
    pub fn answer_side(&self, direction: Direction) -> String {
        match direction {
            Direction::PromptToTranslation => self.translation.clone(),
            Direction::TranslationToPrompt => self.prompt_with_aid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft(prompt: &str, aid: &str, translation: &str) -> ItemDraft {
        ItemDraft::new(CollectionId::new(1), prompt, aid, translation)
    }

    #[test]
    fn validate_trims_fields() {
        let item = draft("  你好 ", " nǐ hǎo ", " hello ")
            .validate(fixed_now())
            .unwrap()
            .assign_id(ItemId::new(7));

        assert_eq!(item.prompt(), "你好");
        assert_eq!(item.aid(), "nǐ hǎo");
        assert_eq!(item.translation(), "hello");
        assert_eq!(item.id(), ItemId::new(7));
    }

    #[test]
    fn blank_prompt_and_translation_are_rejected() {
        assert_eq!(
            draft("  ", "x", "hello").validate(fixed_now()).unwrap_err(),
            ItemError::EmptyPrompt
        );
        assert_eq!(
            draft("你好", "x", "").validate(fixed_now()).unwrap_err(),
            ItemError::EmptyTranslation
        );
    }

    #[test]
    fn empty_aid_is_allowed() {
        let item = draft("猫", "", "cat")
            .validate(fixed_now())
            .unwrap()
            .assign_id(ItemId::new(1));
        assert_eq!(item.prompt_with_aid(), "猫");
    }

    #[test]
    fn overlong_text_is_rejected() {
        let long = "a".repeat(MAX_ITEM_TEXT_CHARS + 1);
        let err = draft("猫", "", &long).validate(fixed_now()).unwrap_err();
        assert!(matches!(err, ItemError::TooLong { field: "translation", .. }));
    }

    #[test]
    fn sides_follow_direction() {
        let item = draft("猫", "māo", "cat")
            .validate(fixed_now())
            .unwrap()
            .assign_id(ItemId::new(1));

        assert_eq!(item.question_side(Direction::PromptToTranslation), "猫 (māo)");
        assert_eq!(item.answer_side(Direction::PromptToTranslation), "cat");
        assert_eq!(item.question_side(Direction::TranslationToPrompt), "cat");
        assert_eq!(item.answer_side(Direction::TranslationToPrompt), "猫 (māo)");
    }
}
