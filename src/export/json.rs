//! JSON backup and restore of a user's review progress.
//! Records are validated before anything is written back.

use crate::database::ProgressStore;
use crate::error::{Error, Result};
use crate::models::{ReviewProgress, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressExport {
    pub user_id: UserId,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<ReviewProgress>,
}

/// Writes every progress record of `user_id` to a JSON file.
/// Returns the number of records written.
pub fn export_progress_to_path(
    store: &impl ProgressStore,
    user_id: UserId,
    path: impl AsRef<Path>,
) -> Result<usize> {
    let export = ProgressExport {
        user_id,
        exported_at: Utc::now(),
        records: store.progress_for_user(user_id)?,
    };
    fs::write(path.as_ref(), serde_json::to_string_pretty(&export)?)?;

    info!(user_id, records = export.records.len(), path = %path.as_ref().display(), "progress exported");
    Ok(export.records.len())
}

/// Reads an export file without touching any store.
pub fn read_progress_export(path: impl AsRef<Path>) -> Result<ProgressExport> {
    let contents = fs::read_to_string(path)?;
    let export: ProgressExport = serde_json::from_str(&contents)?;
    Ok(export)
}

/// Restores an export file into `store`. See [`restore_export`].
pub fn import_progress(store: &impl ProgressStore, path: impl AsRef<Path>) -> Result<usize> {
    let export = read_progress_export(path.as_ref())?;
    restore_export(store, &export)
}

/// Writes an already-read export back in one batch.
///
/// Every record must belong to the export's user, satisfy the record
/// invariants and refer to an existing card; otherwise nothing is written.
/// Records older than the stored progress (fewer reviews) are skipped.
/// Returns the number of records written.
pub fn restore_export(store: &impl ProgressStore, export: &ProgressExport) -> Result<usize> {
    for record in &export.records {
        if record.user_id != export.user_id {
            return Err(Error::InvalidProgress(format!(
                "record for user {} in export of user {}",
                record.user_id, export.user_id
            )));
        }
        record.validate()?;
        if store.get_card(record.card_id)?.is_none() {
            return Err(Error::CardNotFound(record.card_id));
        }
    }

    let written = store.restore_progress(&export.records)?;
    let skipped = export.records.len() - written;
    if skipped > 0 {
        warn!(user_id = export.user_id, skipped, "kept newer stored progress over backup");
    }
    info!(user_id = export.user_id, records = written, "progress imported");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStore;
    use chrono::Duration;
    use std::fs;

    fn store_with_progress() -> (InMemoryStore, ReviewProgress) {
        let store = InMemoryStore::new();
        let deck = store.add_deck("Verbs");
        let card = store.add_card(deck.id, "食べる", "to eat").unwrap();
        let now = Utc::now();
        let record = ReviewProgress {
            user_id: 1,
            card_id: card.id,
            ease: 235,
            interval: 0.1,
            reviews: 3,
            lapses: 1,
            last_reviewed: now,
            next_review: now + Duration::minutes(144),
        };
        store.restore_progress(std::slice::from_ref(&record)).unwrap();
        (store, record)
    }

    #[test]
    fn test_export_and_import_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let (store, record) = store_with_progress();

        assert_eq!(export_progress_to_path(&store, 1, &path).unwrap(), 1);

        let target = InMemoryStore::new();
        let deck = target.add_deck("Verbs");
        target.add_card(deck.id, "食べる", "to eat").unwrap();
        assert_eq!(import_progress(&target, &path).unwrap(), 1);
        assert_eq!(target.get_progress(1, record.card_id).unwrap(), Some(record));
    }

    #[test]
    fn test_import_keeps_newer_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let (store, record) = store_with_progress();
        export_progress_to_path(&store, 1, &path).unwrap();

        let newer = ReviewProgress {
            reviews: record.reviews + 2,
            lapses: record.lapses + 2,
            ..record.clone()
        };
        store.upsert_progress(Some(&record), &newer, None).unwrap();

        assert_eq!(import_progress(&store, &path).unwrap(), 0);
        assert_eq!(store.get_progress(1, record.card_id).unwrap(), Some(newer));
    }

    #[test]
    fn test_import_nonexistent_file() {
        let store = InMemoryStore::new();
        assert!(matches!(
            import_progress(&store, "nonexistent_file_xyz123.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_import_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.json");
        fs::write(&path, "{ this is not valid json }").unwrap();

        let store = InMemoryStore::new();
        assert!(matches!(import_progress(&store, &path), Err(Error::Json(_))));
    }

    #[test]
    fn test_import_rejects_out_of_range_ease() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let (store, record) = store_with_progress();
        let export = ProgressExport {
            user_id: 1,
            exported_at: Utc::now(),
            records: vec![ReviewProgress { ease: 90, ..record.clone() }],
        };
        fs::write(&path, serde_json::to_string(&export).unwrap()).unwrap();

        assert!(matches!(
            import_progress(&store, &path),
            Err(Error::InvalidProgress(_))
        ));
        assert_eq!(store.get_progress(1, record.card_id).unwrap(), Some(record));
    }

    #[test]
    fn test_import_rejects_unknown_card() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let (store, _) = store_with_progress();
        export_progress_to_path(&store, 1, &path).unwrap();

        let empty = InMemoryStore::new();
        assert!(matches!(
            import_progress(&empty, &path),
            Err(Error::CardNotFound(_))
        ));
        assert!(empty.progress_for_user(1).unwrap().is_empty());
    }
}
