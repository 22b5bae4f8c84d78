//! Study session state for one pass over the due cards of some decks.
//!
//! The session is a plain value: the caller persists each rating through the
//! review service and then records it here. Every rated card leaves the
//! remaining pool for good, including cards rated "again"; they come back in a
//! later session once due.

use super::{CardId, DeckId, Rating, UserId};
use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq)]
pub struct StudySession {
    pub user_id: UserId,
    pub deck_ids: Vec<DeckId>,
    remaining: VecDeque<CardId>,
    completed: Vec<(CardId, Rating)>,
}

impl StudySession {
    /// Creates a session from the due cards, in due-query order.
    pub fn start(user_id: UserId, deck_ids: Vec<DeckId>, due_cards: Vec<CardId>) -> Self {
        Self {
            user_id,
            deck_ids,
            remaining: due_cards.into(),
            completed: Vec::new(),
        }
    }

    /// Card currently presented, `None` once the session is complete.
    pub fn current(&self) -> Option<CardId> {
        self.remaining.front().copied()
    }

    /// Marks a card as done for this session. Returns false if the card was
    /// not waiting in the remaining pool.
    pub fn record(&mut self, card_id: CardId, rating: Rating) -> bool {
        let Some(pos) = self.remaining.iter().position(|&id| id == card_id) else {
            return false;
        };
        self.remaining.remove(pos);
        self.completed.push((card_id, rating));
        true
    }

    /// Drops a card from the pool without counting it as reviewed, e.g. when
    /// it was deleted after the session started.
    pub fn skip(&mut self, card_id: CardId) -> bool {
        let before = self.remaining.len();
        self.remaining.retain(|&id| id != card_id);
        self.remaining.len() != before
    }

    pub fn remaining(&self) -> impl Iterator<Item = CardId> + '_ {
        self.remaining.iter().copied()
    }

    pub fn completed(&self) -> &[(CardId, Rating)] {
        &self.completed
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn remaining_count(&self) -> usize {
        self.remaining.len()
    }

    pub fn total_count(&self) -> usize {
        self.completed.len() + self.remaining.len()
    }

    pub fn count_rated(&self, rating: Rating) -> usize {
        self.completed.iter().filter(|(_, r)| *r == rating).count()
    }

    pub fn is_completed(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn progress_percent(&self) -> u32 {
        match self.total_count() {
            0 => 100,
            total => (self.completed_count() * 100 / total) as u32,
        }
    }

    pub fn phase_message(&self) -> String {
        if self.is_completed() {
            format!("Session complete: {} cards reviewed", self.completed_count())
        } else {
            format!(
                "Card {} of {}",
                self.completed_count() + 1,
                self.total_count()
            )
        }
    }
}
