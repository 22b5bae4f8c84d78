//! Partitions candidate cards into due and not-due for one user.
//!
//! A card is due when the user has no progress record for it or its
//! `next_review <= now`. Results list the newest card first (by `created_at`,
//! then by id), so freshly added vocabulary is studied before older backlog.

use super::{CardId, Flashcard, ReviewProgress};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DuePartition {
    pub due: Vec<CardId>,
    pub not_due: Vec<CardId>,
}

/// `progress` holds this user's records keyed by card id; cards absent from it
/// have never been rated. Duplicate cards in the input are reported once.
pub fn partition_due(
    cards: &[Flashcard],
    progress: &HashMap<CardId, ReviewProgress>,
    now: DateTime<Utc>,
) -> DuePartition {
    let mut ordered: Vec<&Flashcard> = cards.iter().collect();
    ordered.sort_by_key(|card| (Reverse(card.created_at), Reverse(card.id)));

    let mut seen = HashSet::new();
    let mut partition = DuePartition::default();
    for card in ordered {
        if !seen.insert(card.id) {
            continue;
        }
        let due = progress.get(&card.id).is_none_or(|p| p.is_due(now));
        if due {
            partition.due.push(card.id);
        } else {
            partition.not_due.push(card.id);
        }
    }
    partition
}

pub fn get_due(
    cards: &[Flashcard],
    progress: &HashMap<CardId, ReviewProgress>,
    now: DateTime<Utc>,
) -> Vec<CardId> {
    partition_due(cards, progress, now).due
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn card(id: CardId, created_at: DateTime<Utc>) -> Flashcard {
        Flashcard {
            id,
            deck_id: 1,
            front: format!("front {id}"),
            back: format!("back {id}"),
            reading: None,
            created_at,
        }
    }

    fn progress(card_id: CardId, next_review: DateTime<Utc>) -> ReviewProgress {
        ReviewProgress {
            user_id: 1,
            card_id,
            ease: 250,
            interval: 1.0,
            reviews: 1,
            lapses: 0,
            last_reviewed: next_review - Duration::days(1),
            next_review,
        }
    }

    #[test]
    fn deck_with_mixed_cards() {
        let now = Utc::now();
        let created = now - Duration::days(10);
        let cards = vec![card(1, created), card(2, created), card(3, created)];
        let records = HashMap::from([
            (1, progress(1, now)),
            (3, progress(3, now + Duration::days(5))),
        ]);

        let partition = partition_due(&cards, &records, now);
        assert_eq!(partition.due, vec![2, 1]);
        assert_eq!(partition.not_due, vec![3]);
    }

    #[test]
    fn unrated_card_is_always_due() {
        let now = Utc::now();
        let cards = vec![card(5, now + Duration::days(1))];
        assert_eq!(get_due(&cards, &HashMap::new(), now), vec![5]);
    }

    #[test]
    fn newest_card_first() {
        let now = Utc::now();
        let cards = vec![
            card(1, now - Duration::days(3)),
            card(2, now - Duration::days(1)),
            card(3, now - Duration::days(2)),
        ];
        assert_eq!(get_due(&cards, &HashMap::new(), now), vec![2, 3, 1]);
    }

    #[test]
    fn repeated_query_is_identical() {
        let now = Utc::now();
        let cards = vec![card(1, now), card(2, now)];
        let records = HashMap::from([(2, progress(2, now + Duration::hours(1)))]);
        assert_eq!(
            partition_due(&cards, &records, now),
            partition_due(&cards, &records, now)
        );
    }

    #[test]
    fn duplicate_candidates_are_reported_once() {
        let now = Utc::now();
        let cards = vec![card(1, now), card(1, now)];
        assert_eq!(get_due(&cards, &HashMap::new(), now), vec![1]);
    }
}
