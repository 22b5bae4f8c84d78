//! Review service: the single path through which ratings are applied and due
//! cards are queried.
//!
//! Ratings for one (user, card) pair are serialized by a per-pair lock held
//! across the read-modify-write cycle, and the store's compare-and-swap
//! rejects writes derived from a stale record, so a lost race surfaces as
//! `ConcurrentUpdateConflict` rather than a silently overwritten history.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::database::ProgressStore;
use crate::error::{Error, Result};
use crate::export::json;
use crate::models::{
    CardId, DeckDueSummary, DeckId, Flashcard, Rating, ReviewProgress, ReviewStats, StudySession,
    UserId, due_query, scheduler,
};

/// One rating submission.
#[derive(Clone, Debug, PartialEq)]
pub struct RatingRequest {
    pub user_id: UserId,
    pub card_id: CardId,
    pub rating: Rating,
    /// Client-chosen key; resubmitting the same key returns the stored record
    /// instead of counting the review twice.
    pub idempotency_key: Option<String>,
}

impl RatingRequest {
    pub fn new(user_id: UserId, card_id: CardId, rating: Rating) -> Self {
        Self {
            user_id,
            card_id,
            rating,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

pub struct ReviewService<S> {
    store: S,
    config: SchedulerConfig,
    pair_locks: DashMap<(UserId, CardId), Arc<Mutex<()>>>,
}

impl<S: ProgressStore> ReviewService<S> {
    pub fn new(store: S, config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            pair_locks: DashMap::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Due cards across the given decks, newest card first.
    pub fn get_due_cards(&self, user_id: UserId, deck_ids: &[DeckId]) -> Result<Vec<CardId>> {
        self.get_due_cards_at(user_id, deck_ids, Utc::now())
    }

    #[tracing::instrument(skip(self))]
    pub fn get_due_cards_at(
        &self,
        user_id: UserId,
        deck_ids: &[DeckId],
        now: DateTime<Utc>,
    ) -> Result<Vec<CardId>> {
        let cards = self.cards_for_decks(deck_ids)?;
        let card_ids: Vec<CardId> = cards.iter().map(|card| card.id).collect();
        let progress = self.store.progress_for_cards(user_id, &card_ids)?;

        let due = due_query::get_due(&cards, &progress, now);
        debug!(candidates = cards.len(), due = due.len(), "due query");
        Ok(due)
    }

    fn cards_for_decks(&self, deck_ids: &[DeckId]) -> Result<Vec<Flashcard>> {
        let mut cards = Vec::new();
        for &deck_id in deck_ids {
            if self.store.get_deck(deck_id)?.is_none() {
                return Err(Error::DeckNotFound(deck_id));
            }
            cards.extend(self.store.cards_by_deck(deck_id)?);
        }
        Ok(cards)
    }

    /// Applies a rating now and returns the updated record.
    pub fn rate_card(&self, user_id: UserId, card_id: CardId, rating: Rating) -> Result<ReviewProgress> {
        self.submit_rating(&RatingRequest::new(user_id, card_id, rating), Utc::now())
    }

    /// Applies a rating as of `now`.
    ///
    /// On error nothing has been written and the previous record is intact.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = request.user_id, card_id = request.card_id, rating = %request.rating)
    )]
    pub fn submit_rating(&self, request: &RatingRequest, now: DateTime<Utc>) -> Result<ReviewProgress> {
        let card = self
            .store
            .get_card(request.card_id)?
            .ok_or(Error::CardNotFound(request.card_id))?;

        let pair = (request.user_id, request.card_id);
        let lock = self.pair_lock(pair);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.apply_locked(request, now)
        };
        drop(lock);
        self.release_pair(pair);

        let stored = result?;
        if let Err(err) = self.store.touch_deck(card.deck_id, now) {
            warn!(deck_id = card.deck_id, error = %err, "failed to update deck last studied");
        }
        Ok(stored)
    }

    fn apply_locked(&self, request: &RatingRequest, now: DateTime<Utc>) -> Result<ReviewProgress> {
        let key = request.idempotency_key.as_deref();
        if let Some(key) = key {
            if let Some(existing) = self.store.find_submission(request.user_id, key)? {
                if existing.card_id != request.card_id {
                    return Err(Error::IdempotencyKeyReused {
                        key: key.to_string(),
                        used_for: existing.card_id,
                    });
                }
                info!(key, reviews = existing.reviews, "duplicate submission ignored");
                return Ok(existing);
            }
        }

        let previous = self.store.get_progress(request.user_id, request.card_id)?;
        let next = scheduler::apply_rating(
            request.user_id,
            request.card_id,
            previous.as_ref(),
            request.rating,
            &self.config,
            now,
        );
        let stored = self.store.upsert_progress(previous.as_ref(), &next, key)?;

        info!(
            reviews = stored.reviews,
            lapses = stored.lapses,
            ease = stored.ease,
            interval = stored.interval,
            next_review = %stored.next_review,
            "rating applied"
        );
        Ok(stored)
    }

    fn pair_lock(&self, pair: (UserId, CardId)) -> Arc<Mutex<()>> {
        self.pair_locks.entry(pair).or_default().clone()
    }

    /// Drops the pair's lock entry once nobody else is waiting on it.
    fn release_pair(&self, pair: (UserId, CardId)) {
        self.pair_locks.remove_if(&pair, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Restores a progress export while holding the lock of every pair it
    /// touches, so a backup never interleaves with a rating of the same pair.
    /// Stored records with more reviews than the backup are kept.
    #[tracing::instrument(skip_all)]
    pub fn import_progress(&self, path: impl AsRef<Path>) -> Result<usize> {
        let export = json::read_progress_export(path.as_ref())?;

        // Locks are taken in key order; ratings only ever hold one
        let pairs: BTreeSet<(UserId, CardId)> = export
            .records
            .iter()
            .map(|record| (record.user_id, record.card_id))
            .collect();
        let locks: Vec<_> = pairs.iter().map(|&pair| self.pair_lock(pair)).collect();
        let result = {
            let _guards: Vec<_> = locks
                .iter()
                .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
                .collect();
            json::restore_export(&self.store, &export)
        };
        drop(locks);
        for pair in pairs {
            self.release_pair(pair);
        }
        result
    }

    /// Per-deck due counts; with `only_due`, decks without due cards are dropped.
    pub fn deck_due_summaries(
        &self,
        user_id: UserId,
        only_due: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeckDueSummary>> {
        let mut summaries = Vec::new();
        for deck in self.store.list_decks()? {
            let due_count = self.get_due_cards_at(user_id, &[deck.id], now)?.len();
            let summary = DeckDueSummary::new(deck, due_count);
            if !only_due || summary.has_due_cards {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    pub fn user_stats(&self, user_id: UserId) -> Result<ReviewStats> {
        Ok(ReviewStats::from_progress(&self.store.progress_for_user(user_id)?))
    }

    /// Starts a session over the cards currently due in `deck_ids`.
    pub fn start_session(
        &self,
        user_id: UserId,
        deck_ids: Vec<DeckId>,
        now: DateTime<Utc>,
    ) -> Result<StudySession> {
        let due = self.get_due_cards_at(user_id, &deck_ids, now)?;
        info!(user_id, cards = due.len(), "study session started");
        Ok(StudySession::start(user_id, deck_ids, due))
    }

    /// Rates the session's current card. The card leaves the session only if
    /// the rating was saved; returns `None` when the session is already complete.
    pub fn rate_current(
        &self,
        session: &mut StudySession,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<Option<ReviewProgress>> {
        let Some(card_id) = session.current() else {
            return Ok(None);
        };
        let progress = self.submit_rating(&RatingRequest::new(session.user_id, card_id, rating), now)?;
        session.record(card_id, rating);
        Ok(Some(progress))
    }
}
