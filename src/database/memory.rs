//! In-memory progress store for tests and embedding callers that bring their
//! own persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::store::ProgressStore;
use crate::error::{Error, Result};
use crate::models::{CardId, Deck, DeckId, Flashcard, ReviewProgress, UserId};

#[derive(Default)]
struct State {
    next_id: i64,
    decks: BTreeMap<DeckId, Deck>,
    cards: BTreeMap<CardId, Flashcard>,
    progress: HashMap<(UserId, CardId), ReviewProgress>,
    submissions: HashMap<(UserId, String), CardId>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every subsequent write fail with `StorageUnavailable` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    pub fn add_deck(&self, name: &str) -> Deck {
        let mut state = self.lock();
        let deck = Deck {
            id: state.allocate_id(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
            last_studied: None,
        };
        state.decks.insert(deck.id, deck.clone());
        deck
    }

    pub fn add_card(&self, deck_id: DeckId, front: &str, back: &str) -> Result<Flashcard> {
        self.add_card_at(deck_id, front, back, Utc::now())
    }

    pub fn add_card_at(
        &self,
        deck_id: DeckId,
        front: &str,
        back: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Flashcard> {
        let mut state = self.lock();
        if !state.decks.contains_key(&deck_id) {
            return Err(Error::DeckNotFound(deck_id));
        }
        let card = Flashcard {
            id: state.allocate_id(),
            deck_id,
            front: front.to_string(),
            back: back.to_string(),
            reading: None,
            created_at,
        };
        state.cards.insert(card.id, card.clone());
        Ok(card)
    }

    /// Deletes a card together with every user's progress for it.
    pub fn delete_card(&self, card_id: CardId) -> bool {
        let mut state = self.lock();
        state.progress.retain(|&(_, id), _| id != card_id);
        state.submissions.retain(|_, id| *id != card_id);
        state.cards.remove(&card_id).is_some()
    }
}

impl ProgressStore for InMemoryStore {
    fn get_card(&self, card_id: CardId) -> Result<Option<Flashcard>> {
        Ok(self.lock().cards.get(&card_id).cloned())
    }

    fn get_deck(&self, deck_id: DeckId) -> Result<Option<Deck>> {
        Ok(self.lock().decks.get(&deck_id).cloned())
    }

    fn list_decks(&self) -> Result<Vec<Deck>> {
        Ok(self.lock().decks.values().cloned().collect())
    }

    fn cards_by_deck(&self, deck_id: DeckId) -> Result<Vec<Flashcard>> {
        Ok(self
            .lock()
            .cards
            .values()
            .filter(|card| card.deck_id == deck_id)
            .cloned()
            .collect())
    }

    fn get_progress(&self, user_id: UserId, card_id: CardId) -> Result<Option<ReviewProgress>> {
        Ok(self.lock().progress.get(&(user_id, card_id)).cloned())
    }

    fn progress_for_cards(
        &self,
        user_id: UserId,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, ReviewProgress>> {
        let state = self.lock();
        Ok(card_ids
            .iter()
            .filter_map(|&id| state.progress.get(&(user_id, id)).map(|p| (id, p.clone())))
            .collect())
    }

    fn progress_for_user(&self, user_id: UserId) -> Result<Vec<ReviewProgress>> {
        let mut records: Vec<_> = self
            .lock()
            .progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|p| p.card_id);
        Ok(records)
    }

    fn upsert_progress(
        &self,
        previous: Option<&ReviewProgress>,
        next: &ReviewProgress,
        idempotency_key: Option<&str>,
    ) -> Result<ReviewProgress> {
        self.check_available()?;
        let conflict = Error::ConcurrentUpdateConflict {
            user_id: next.user_id,
            card_id: next.card_id,
        };

        let mut state = self.lock();
        if !state.cards.contains_key(&next.card_id) {
            return Err(Error::CardNotFound(next.card_id));
        }
        let pair = (next.user_id, next.card_id);
        let current_reviews = state.progress.get(&pair).map(|p| p.reviews);
        if current_reviews != previous.map(|p| p.reviews) {
            return Err(conflict);
        }
        if let Some(key) = idempotency_key {
            let submission = (next.user_id, key.to_string());
            if state.submissions.contains_key(&submission) {
                return Err(conflict);
            }
            state.submissions.insert(submission, next.card_id);
        }

        state.progress.insert(pair, next.clone());
        Ok(next.clone())
    }

    fn find_submission(&self, user_id: UserId, key: &str) -> Result<Option<ReviewProgress>> {
        let state = self.lock();
        Ok(state
            .submissions
            .get(&(user_id, key.to_string()))
            .and_then(|&card_id| state.progress.get(&(user_id, card_id)))
            .cloned())
    }

    fn restore_progress(&self, records: &[ReviewProgress]) -> Result<usize> {
        self.check_available()?;
        let mut state = self.lock();
        if let Some(missing) = records.iter().find(|r| !state.cards.contains_key(&r.card_id)) {
            return Err(Error::CardNotFound(missing.card_id));
        }

        let mut written = 0;
        for record in records {
            let pair = (record.user_id, record.card_id);
            if state.progress.get(&pair).is_some_and(|p| p.reviews >= record.reviews) {
                continue;
            }
            state.progress.insert(pair, record.clone());
            written += 1;
        }
        Ok(written)
    }

    fn touch_deck(&self, deck_id: DeckId, studied_at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        if let Some(deck) = self.lock().decks.get_mut(&deck_id) {
            deck.last_studied = Some(studied_at);
        }
        Ok(())
    }
}
