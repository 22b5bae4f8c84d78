//! Interval and ease computation for review ratings.
//!
//! A simplified SM-2 variant working on percentage eases:
//! - The first rating of a pair uses fixed base intervals and leaves the ease alone
//! - Later ratings adjust the ease first (again -20, hard -15, easy +15, clamped
//!   to 130..=370), then grow the previous interval using the adjusted ease
//! - "again" always resets the interval to the base again-interval and counts a lapse
//! - The interval modifier scales every result except that reset
//! - No interval exceeds the configured maximum

use super::review_progress::{DEFAULT_EASE, clamp_ease, interval_duration};
use super::{CardId, Rating, ReviewProgress, UserId};
use crate::config::SchedulerConfig;
use chrono::{DateTime, Utc};

/// Computes the ease and interval (days) a rating would produce.
pub fn next_ease_and_interval(
    existing: Option<&ReviewProgress>,
    rating: Rating,
    config: &SchedulerConfig,
) -> (i32, f64) {
    // Ease moves first, the interval grows with the adjusted ease
    let current_ease = existing.map_or(DEFAULT_EASE, |p| p.ease);
    let first_review = existing.is_none_or(|p| p.reviews == 0);

    let ease = if first_review {
        clamp_ease(current_ease)
    } else {
        clamp_ease(current_ease + rating.ease_delta())
    };

    // Lapse: back to the short relearning interval
    if rating == Rating::Again {
        return (ease, config.again_interval);
    }

    let interval = if first_review {
        // Fixed base intervals for a card never reviewed
        match rating {
            Rating::Hard => config.hard_interval,
            Rating::Easy => config.initial_interval * config.easy_bonus,
            _ => config.initial_interval,
        }
    } else {
        let previous = existing.map_or(0.0, |p| p.interval.max(0.0));
        let multiplier = f64::from(ease) / 100.0;
        match rating {
            Rating::Hard => previous * config.hard_factor,
            Rating::Easy => previous * multiplier * config.easy_bonus,
            _ => previous * multiplier,
        }
    };

    (ease, (interval * config.interval_modifier).min(config.maximum_interval))
}

/// Applies one rating to a pair's progress, creating the record on first review.
pub fn apply_rating(
    user_id: UserId,
    card_id: CardId,
    existing: Option<&ReviewProgress>,
    rating: Rating,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> ReviewProgress {
    let (ease, interval) = next_ease_and_interval(existing, rating, config);

    let reviews = existing.map_or(0, |p| p.reviews).saturating_add(1);
    let mut lapses = existing.map_or(0, |p| p.lapses);
    if rating == Rating::Again {
        lapses = lapses.saturating_add(1);
    }

    ReviewProgress {
        user_id,
        card_id,
        ease,
        interval,
        reviews,
        lapses,
        last_reviewed: now,
        // Saturate rather than overflow the calendar
        next_review: now
            .checked_add_signed(interval_duration(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    }
}

/// Intervals for Again, Hard, Good and Easy, in that order.
/// Used to label the rating buttons before the user answers.
pub fn preview_intervals(existing: Option<&ReviewProgress>, config: &SchedulerConfig) -> [f64; 4] {
    Rating::ALL.map(|rating| next_ease_and_interval(existing, rating, config).1)
}

/// Formats an interval in days to a short human-readable string
pub fn format_interval(days: f64) -> String {
    if days < 1.0 {
        let hours = (days * 24.0).round() as i64;
        if hours < 1 {
            let minutes = (days * 24.0 * 60.0).round().max(1.0) as i64;
            return format!("{}m", minutes);
        }
        return format!("{}h", hours);
    }

    let days = days.round() as i64;
    if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn record(ease: i32, interval: f64, reviews: u32, lapses: u32) -> ReviewProgress {
        let now = Utc::now();
        ReviewProgress {
            user_id: 1,
            card_id: 1,
            ease,
            interval,
            reviews,
            lapses,
            last_reviewed: now,
            next_review: now,
        }
    }

    #[test_case(Rating::Again, 0.1)]
    #[test_case(Rating::Hard, 0.5)]
    #[test_case(Rating::Good, 1.0)]
    #[test_case(Rating::Easy, 2.0)]
    fn first_review_uses_base_intervals(rating: Rating, expected: f64) {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let next = apply_rating(1, 1, None, rating, &config, now);
        assert_eq!(next.interval, expected);
        assert_eq!(next.ease, DEFAULT_EASE);
        assert_eq!(next.reviews, 1);
    }

    #[test]
    fn first_good_review_scenario() {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let next = apply_rating(1, 9, None, Rating::Good, &config, now);

        assert_eq!(next.reviews, 1);
        assert_eq!(next.lapses, 0);
        assert_eq!(next.interval, 1.0);
        assert_eq!(next.ease, 250);
        assert_eq!(next.last_reviewed, now);
        assert_eq!(next.next_review, next.last_reviewed + Duration::days(1));
    }

    #[test]
    fn again_after_good_resets_interval_and_counts_lapse() {
        let config = SchedulerConfig::default();
        let now = Utc::now();
        let first = apply_rating(1, 9, None, Rating::Good, &config, now);
        let later = now + Duration::days(1);
        let second = apply_rating(1, 9, Some(&first), Rating::Again, &config, later);

        assert_eq!(second.reviews, 2);
        assert_eq!(second.lapses, 1);
        assert_eq!(second.ease, 230);
        assert_eq!(second.interval, 0.1);
        assert_eq!(second.next_review, later + Duration::minutes(144));
    }

    #[test]
    fn again_reset_ignores_long_previous_interval_and_modifier() {
        let config = SchedulerConfig {
            interval_modifier: 1.5,
            ..SchedulerConfig::default()
        };
        let next = apply_rating(1, 1, Some(&record(250, 40.0, 8, 0)), Rating::Again, &config, Utc::now());
        assert_eq!(next.interval, 0.1);
    }

    #[test]
    fn good_uses_updated_ease_as_multiplier() {
        let config = SchedulerConfig::default();
        let next = apply_rating(1, 1, Some(&record(250, 4.0, 3, 0)), Rating::Good, &config, Utc::now());
        assert_eq!(next.ease, 250);
        assert_eq!(next.interval, 10.0);
    }

    #[test]
    fn easy_raises_ease_before_growing_interval() {
        let config = SchedulerConfig::default();
        let next = apply_rating(1, 1, Some(&record(250, 2.0, 2, 0)), Rating::Easy, &config, Utc::now());
        assert_eq!(next.ease, 265);
        // 2 * 2.65 * 2
        assert!((next.interval - 10.6).abs() < 1e-9);
    }

    #[test]
    fn hard_halves_previous_interval() {
        let config = SchedulerConfig::default();
        let next = apply_rating(1, 1, Some(&record(250, 6.0, 4, 1)), Rating::Hard, &config, Utc::now());
        assert_eq!(next.ease, 235);
        assert_eq!(next.interval, 3.0);
        assert_eq!(next.lapses, 1);
    }

    #[test]
    fn modifier_scales_non_again_intervals() {
        let config = SchedulerConfig {
            interval_modifier: 2.0,
            ..SchedulerConfig::default()
        };
        let first = apply_rating(1, 1, None, Rating::Good, &config, Utc::now());
        assert_eq!(first.interval, 2.0);

        let next = apply_rating(1, 1, Some(&record(250, 4.0, 3, 0)), Rating::Good, &config, Utc::now());
        assert_eq!(next.interval, 20.0);
    }

    #[test]
    fn interval_is_capped() {
        let config = SchedulerConfig::default();
        let next = apply_rating(1, 1, Some(&record(370, 30000.0, 20, 0)), Rating::Easy, &config, Utc::now());
        assert_eq!(next.interval, config.maximum_interval);
    }

    #[test]
    fn unvalidated_huge_interval_saturates_next_review() {
        let config = SchedulerConfig {
            maximum_interval: 1e12,
            ..SchedulerConfig::default()
        };
        let mut progress = apply_rating(1, 1, None, Rating::Easy, &config, Utc::now());
        for _ in 0..12 {
            progress = apply_rating(1, 1, Some(&progress), Rating::Easy, &config, Utc::now());
        }
        assert_eq!(progress.next_review, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn ease_is_clamped_at_both_ends() {
        let config = SchedulerConfig::default();
        let low = apply_rating(1, 1, Some(&record(140, 1.0, 5, 2)), Rating::Again, &config, Utc::now());
        assert_eq!(low.ease, 130);

        let high = apply_rating(1, 1, Some(&record(365, 1.0, 5, 0)), Rating::Easy, &config, Utc::now());
        assert_eq!(high.ease, 370);

        let stale = apply_rating(1, 1, Some(&record(500, 1.0, 5, 0)), Rating::Good, &config, Utc::now());
        assert_eq!(stale.ease, 370);
    }

    #[test]
    fn record_with_zero_reviews_counts_as_first_review() {
        let config = SchedulerConfig::default();
        let next = apply_rating(1, 1, Some(&record(250, 30.0, 0, 0)), Rating::Good, &config, Utc::now());
        assert_eq!(next.interval, 1.0);
        assert_eq!(next.reviews, 1);
    }

    #[test]
    fn preview_matches_apply() {
        let config = SchedulerConfig::default();
        let existing = record(250, 4.0, 3, 0);
        let preview = preview_intervals(Some(&existing), &config);
        for (rating, expected) in Rating::ALL.into_iter().zip(preview) {
            let next = apply_rating(1, 1, Some(&existing), rating, &config, Utc::now());
            assert_eq!(next.interval, expected);
        }
        assert_eq!(preview_intervals(None, &config), [0.1, 0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0.005), "7m");
        assert_eq!(format_interval(0.1), "2h");
        assert_eq!(format_interval(0.5), "12h");
        assert_eq!(format_interval(1.0), "1d");
        assert_eq!(format_interval(3.2), "3d");
        assert_eq!(format_interval(14.0), "2w");
        assert_eq!(format_interval(90.0), "3mo");
        assert_eq!(format_interval(730.0), "2y");
    }
}
