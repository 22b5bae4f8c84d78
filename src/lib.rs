pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod models;
pub mod service;

pub use config::{AppConfig, SchedulerConfig};
pub use error::{Error, Result};
pub use models::{Deck, Flashcard, Rating, ReviewProgress, StudySession};
pub use service::{RatingRequest, ReviewService};
