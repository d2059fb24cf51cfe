//! Multiple-choice questions built from a collection's own items.

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use serde::Serialize;

use vocab_core::model::{Direction, Interaction, Item, ItemId};

/// A question ready to show: the cue, shuffled options, and which one is right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizQuestion {
    pub item_id: ItemId,
    pub direction: Direction,
    pub prompt: String,
    pub options: Vec<String>,
    answer_index: usize,
}

impl QuizQuestion {
    #[must_use]
    pub fn answer(&self) -> &str {
        &self.options[self.answer_index]
    }

    #[must_use]
    pub fn answer_index(&self) -> usize {
        self.answer_index
    }

    /// Whether the selected option index is the right one.
    #[must_use]
    pub fn is_correct_choice(&self, choice: usize) -> bool {
        choice == self.answer_index
    }

    /// Whether a typed or selected answer matches, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn is_correct(&self, response: &str) -> bool {
        response.trim().to_lowercase() == self.answer().trim().to_lowercase()
    }

    /// Grade `response` into a quiz interaction for the session coordinator.
    #[must_use]
    pub fn to_interaction(&self, response: &str, response_time_ms: Option<i64>) -> Interaction {
        Interaction::quiz(self.is_correct(response), response_time_ms)
    }
}

#[derive(Debug, Clone)]
pub struct QuizBuilder {
    choices: usize,
}

impl Default for QuizBuilder {
    fn default() -> Self {
        Self { choices: 4 }
    }
}

impl QuizBuilder {
    /// `choices` counts the answer itself; values below 1 are treated as 1.
    #[must_use]
    pub fn new(choices: usize) -> Self {
        Self {
            choices: choices.max(1),
        }
    }

    /// Build a question for `target`, drawing distractors from `pool`.
    ///
    /// Distractors are other items' answer sides, de-duplicated against the
    /// answer. With fewer candidates than needed the question carries fewer
    /// options, down to the answer alone.
    pub fn build<R: Rng + ?Sized>(
        &self,
        target: &Item,
        pool: &[Item],
        direction: Direction,
        rng: &mut R,
    ) -> QuizQuestion {
        let answer = target.answer_side(direction);
        let normalized_answer = answer.trim().to_lowercase();

        let mut candidates: Vec<String> = Vec::new();
        for item in pool.iter().filter(|i| i.id() != target.id()) {
            let side = item.answer_side(direction);
            let key = side.trim().to_lowercase();
            if key != normalized_answer
                && !candidates.iter().any(|c| c.trim().to_lowercase() == key)
            {
                candidates.push(side);
            }
        }

        let wanted = self.choices - 1;
        let mut options: Vec<String> = candidates
            .choose_multiple(rng, wanted)
            .cloned()
            .collect();
        options.push(answer.clone());
        options.shuffle(rng);

        let answer_index = options
            .iter()
            .position(|o| *o == answer)
            .unwrap_or_default();

        QuizQuestion {
            item_id: target.id(),
            direction,
            prompt: target.question_side(direction),
            options,
            answer_index,
        }
    }
}
