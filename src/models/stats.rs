//! Learning statistics for one user.
use super::ReviewProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total_reviews: u64,
    pub total_lapses: u64,
    pub cards_studied: usize,
    /// Share of reviews not rated "again", as a whole percentage.
    pub accuracy: u32,
    pub last_studied: Option<DateTime<Utc>>,
}

impl ReviewStats {
    pub fn from_progress(records: &[ReviewProgress]) -> Self {
        let total_reviews: u64 = records.iter().map(|p| u64::from(p.reviews)).sum();
        let total_lapses: u64 = records.iter().map(|p| u64::from(p.lapses)).sum();
        let accuracy = if total_reviews > 0 {
            let correct = total_reviews.saturating_sub(total_lapses);
            ((correct as f64 / total_reviews as f64) * 100.0).round() as u32
        } else {
            0
        };

        Self {
            total_reviews,
            total_lapses,
            cards_studied: records.iter().filter(|p| p.reviews > 0).count(),
            accuracy,
            last_studied: records.iter().map(|p| p.last_reviewed).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stats_from_records() {
        let now = Utc::now();
        let record = |card_id, reviews, lapses, last_reviewed| ReviewProgress {
            user_id: 1,
            card_id,
            ease: 250,
            interval: 1.0,
            reviews,
            lapses,
            last_reviewed,
            next_review: last_reviewed,
        };
        let stats = ReviewStats::from_progress(&[
            record(1, 3, 1, now - Duration::days(2)),
            record(2, 5, 0, now),
        ]);

        assert_eq!(stats.total_reviews, 8);
        assert_eq!(stats.total_lapses, 1);
        assert_eq!(stats.cards_studied, 2);
        assert_eq!(stats.accuracy, 88);
        assert_eq!(stats.last_studied, Some(now));
    }

    #[test]
    fn test_empty_stats() {
        assert_eq!(ReviewStats::from_progress(&[]), ReviewStats::default());
    }
}
