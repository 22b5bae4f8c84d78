pub mod deck;
pub mod due_query;
pub mod flashcard;
pub mod rating;
pub mod review_progress;
pub mod scheduler;
pub mod stats;
pub mod study_session;

pub use deck::{Deck, DeckDueSummary};
pub use due_query::DuePartition;
pub use flashcard::Flashcard;
pub use rating::Rating;
pub use review_progress::ReviewProgress;
pub use stats::ReviewStats;
pub use study_session::StudySession;

pub type UserId = i64;
pub type CardId = i64;
pub type DeckId = i64;
