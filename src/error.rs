//! Error types for the scheduler, its stores and the progress export.

use thiserror::Error;

use crate::models::{CardId, DeckId, UserId};

/// Errors surfaced by scheduling, due queries and persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// Rating submitted for a card that does not exist.
    #[error("card not found: {0}")]
    CardNotFound(CardId),

    #[error("deck not found: {0}")]
    DeckNotFound(DeckId),

    /// Rating value outside again/hard/good/easy.
    #[error("invalid rating: {0:?} (expected again, hard, good or easy)")]
    InvalidRating(String),

    /// Another update for the same (user, card) pair won the compare-and-swap.
    #[error("concurrent update on progress for user {user_id}, card {card_id}")]
    ConcurrentUpdateConflict { user_id: UserId, card_id: CardId },

    /// Idempotency key already used by this user for a different card.
    #[error("idempotency key {key:?} was already used for card {used_for}")]
    IdempotencyKeyReused { key: String, used_for: CardId },

    /// Persistence layer failure. The rating has not been applied.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Imported progress record violates a record invariant.
    #[error("invalid progress record: {0}")]
    InvalidProgress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StorageUnavailable(Box::new(err))
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl Error {
    /// Whether re-running the whole read-modify-write cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConcurrentUpdateConflict { .. } | Error::StorageUnavailable(_)
        )
    }

    /// Message shown to the person studying when a rating could not be saved.
    pub fn user_message(&self) -> String {
        if self.is_retryable() {
            "Rating not saved, please retry.".to_string()
        } else {
            self.to_string()
        }
    }
}
