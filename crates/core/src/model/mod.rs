mod collection;
mod ids;
mod interaction;
mod item;
mod progress;
mod session;

pub use ids::{CollectionId, ItemId, LearnerId, ParseIdError, SessionId};

pub use collection::{Collection, CollectionError};
pub use interaction::{Interaction, InteractionError, InteractionKind, InteractionRecord, Outcome};
pub use item::{Item, ItemDraft, ItemError, MAX_ITEM_TEXT_CHARS, ValidatedItem};
pub use progress::{
    INITIAL_DIFFICULTY, MAX_DIFFICULTY, MIN_DIFFICULTY, MasteryStage, ProgressError,
    ProgressRecord,
};
pub use session::{
    CloseReason, Direction, SessionState, SessionSummary, SessionSummaryError, SessionTally,
};
