//! Storage boundary consumed by the review service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{CardId, Deck, DeckId, Flashcard, ReviewProgress, UserId};

/// Persistence for decks, cards and per-(user, card) review progress.
///
/// Implementations must make [`ProgressStore::upsert_progress`] a single
/// atomic compare-and-swap so that two ratings of the same pair can never
/// both apply on top of the same previous record.
pub trait ProgressStore: Send + Sync {
    fn get_card(&self, card_id: CardId) -> Result<Option<Flashcard>>;

    fn get_deck(&self, deck_id: DeckId) -> Result<Option<Deck>>;

    fn list_decks(&self) -> Result<Vec<Deck>>;

    fn cards_by_deck(&self, deck_id: DeckId) -> Result<Vec<Flashcard>>;

    fn get_progress(&self, user_id: UserId, card_id: CardId) -> Result<Option<ReviewProgress>>;

    /// Records of `user_id` for the given cards; unrated cards are absent.
    fn progress_for_cards(
        &self,
        user_id: UserId,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, ReviewProgress>>;

    fn progress_for_user(&self, user_id: UserId) -> Result<Vec<ReviewProgress>>;

    /// Writes `next` only if the stored record still matches `previous`
    /// (absent when `previous` is `None`, same `reviews` count otherwise).
    /// A mismatch, or an idempotency key already used by this user, fails
    /// with `ConcurrentUpdateConflict` and writes nothing.
    fn upsert_progress(
        &self,
        previous: Option<&ReviewProgress>,
        next: &ReviewProgress,
        idempotency_key: Option<&str>,
    ) -> Result<ReviewProgress>;

    /// Current record of the pair a previously seen idempotency key was used for.
    fn find_submission(&self, user_id: UserId, key: &str) -> Result<Option<ReviewProgress>>;

    /// Restores backed-up records as one atomic batch.
    ///
    /// A record only replaces the stored one when it has strictly more
    /// reviews, so restoring an older backup never rolls history back.
    /// Returns how many records were written; on error nothing is.
    fn restore_progress(&self, records: &[ReviewProgress]) -> Result<usize>;

    fn touch_deck(&self, deck_id: DeckId, studied_at: DateTime<Utc>) -> Result<()>;
}
