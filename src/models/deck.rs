//! Deck is a named set of flashcards
use super::DeckId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped whenever any card of the deck is rated.
    pub last_studied: Option<DateTime<Utc>>,
}

/// How many cards of a deck are due for one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckDueSummary {
    pub deck: Deck,
    pub due_count: usize,
    pub has_due_cards: bool,
}

impl DeckDueSummary {
    pub fn new(deck: Deck, due_count: usize) -> Self {
        Self {
            deck,
            due_count,
            has_due_cards: due_count > 0,
        }
    }
}
