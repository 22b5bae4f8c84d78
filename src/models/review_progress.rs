//! Per-(user, card) review history.
use super::{CardId, UserId};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EASE: i32 = 250;
pub const MIN_EASE: i32 = 130;
pub const MAX_EASE: i32 = 370;

const MILLIS_PER_DAY: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewProgress {
    pub user_id: UserId,
    pub card_id: CardId,
    /// Percentage, 250 = 250%.
    pub ease: i32,
    /// Days until the next review; fractional.
    pub interval: f64,
    pub reviews: u32,
    pub lapses: u32,
    pub last_reviewed: DateTime<Utc>,
    pub next_review: DateTime<Utc>,
}

impl ReviewProgress {
    /// True when `now` has reached the next review time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    /// Checks the record invariants; used before importing external records.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_EASE..=MAX_EASE).contains(&self.ease) {
            return Err(Error::InvalidProgress(format!(
                "ease {} outside {MIN_EASE}..={MAX_EASE} for card {}",
                self.ease, self.card_id
            )));
        }
        if !self.interval.is_finite() || self.interval < 0.0 {
            return Err(Error::InvalidProgress(format!(
                "interval {} is negative for card {}",
                self.interval, self.card_id
            )));
        }
        if self.lapses > self.reviews {
            return Err(Error::InvalidProgress(format!(
                "lapses {} exceed reviews {} for card {}",
                self.lapses, self.reviews, self.card_id
            )));
        }
        Ok(())
    }
}

pub fn clamp_ease(ease: i32) -> i32 {
    ease.clamp(MIN_EASE, MAX_EASE)
}

/// Converts a fractional day count to a duration with millisecond resolution.
pub fn interval_duration(days: f64) -> Duration {
    // `as` saturates, and i64::MAX milliseconds is the largest Duration
    Duration::try_milliseconds((days * MILLIS_PER_DAY).round() as i64).unwrap_or(Duration::MAX)
}
