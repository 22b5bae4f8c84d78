//! Flashcard is a vocabulary pair <front, back>, optionally with a kana reading.
use super::{CardId, DeckId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: CardId,
    pub deck_id: DeckId,
    pub front: String,
    pub back: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flashcard_serializes_camel_case() {
        let card = Flashcard {
            id: 3,
            deck_id: 1,
            front: "猫".to_string(),
            back: "cat".to_string(),
            reading: Some("ねこ".to_string()),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["deckId"], 1);
        assert_eq!(json["reading"], "ねこ");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_missing_reading_is_omitted() {
        let card = Flashcard {
            id: 4,
            deck_id: 1,
            front: "水".to_string(),
            back: "water".to_string(),
            reading: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&card).unwrap();
        assert!(json.get("reading").is_none());
    }
}
