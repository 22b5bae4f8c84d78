//! SQLite storage for decks, cards and review progress
//!
//! Timestamps are stored as Unix milliseconds and intervals as `REAL` days, so
//! sub-day intervals such as 0.1 day survive a round trip through the database.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};
use tracing::{debug, info};

use super::store::ProgressStore;
use crate::error::{Error, Result};
use crate::models::{CardId, Deck, DeckId, Flashcard, ReviewProgress, UserId};

const PROGRESS_COLUMNS: &str =
    "user_id, card_id, ease, interval_days, reviews, lapses, last_reviewed, next_review";

/// Card ids bound per `IN (...)` query.
const CARD_ID_CHUNK: usize = 500;

/// Progress store backed by a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and makes sure all tables exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened progress database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a new deck
    pub fn add_deck(&self, name: &str, description: Option<&str>) -> Result<Deck> {
        let conn = self.lock();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO decks (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, now.timestamp_millis()],
        )?;
        let id = conn.last_insert_rowid();
        info!(deck_id = id, name, "deck created");

        Ok(Deck {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: from_millis(now.timestamp_millis())?,
            last_studied: None,
        })
    }

    /// Adds a card to a deck, created now
    pub fn add_card(
        &self,
        deck_id: DeckId,
        front: &str,
        back: &str,
        reading: Option<&str>,
    ) -> Result<Flashcard> {
        self.add_card_at(deck_id, front, back, reading, Utc::now())
    }

    /// Adds a card to a deck with an explicit creation time
    ///
    /// If a card with the same front already exists in the deck, the
    /// existing card is returned unchanged.
    pub fn add_card_at(
        &self,
        deck_id: DeckId,
        front: &str,
        back: &str,
        reading: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Flashcard> {
        let conn = self.lock();
        if !deck_exists(&conn, deck_id)? {
            return Err(Error::DeckNotFound(deck_id));
        }

        conn.execute(
            "INSERT OR IGNORE INTO cards (deck_id, front, back, reading, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![deck_id, front, back, reading, created_at.timestamp_millis()],
        )?;

        let card = conn.query_row(
            "SELECT id, deck_id, front, back, reading, created_at
             FROM cards WHERE deck_id = ?1 AND front = ?2",
            params![deck_id, front],
            card_from_row,
        )?;
        debug!(card_id = card.id, deck_id, "card added");
        Ok(card)
    }

    /// Deletes a card; its review progress goes with it
    pub fn delete_card(&self, card_id: CardId) -> Result<bool> {
        let conn = self.lock();
        let deleted = conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
        Ok(deleted > 0)
    }
}

/// Creates the tables used by the scheduler. Safe to call on every startup.
fn init_database(conn: &Connection) -> Result<()> {
    // Cascading deletes rely on this per-connection setting
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // Create decks table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS decks (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL UNIQUE,
            description  TEXT,
            created_at   INTEGER NOT NULL,
            last_studied INTEGER
        )",
        [],
    )?;

    // Create cards table, one card per front within a deck
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            deck_id     INTEGER NOT NULL REFERENCES decks(id) ON DELETE CASCADE,
            front       TEXT NOT NULL,
            back        TEXT NOT NULL,
            reading     TEXT,
            created_at  INTEGER NOT NULL,
            UNIQUE(deck_id, front)
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_cards_deck ON cards(deck_id)", [])?;

    // Create study_progress table, one row per (user, card)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS study_progress (
            user_id        INTEGER NOT NULL,
            card_id        INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            ease           INTEGER NOT NULL DEFAULT 250 CHECK (ease BETWEEN 130 AND 370),
            interval_days  REAL NOT NULL DEFAULT 0 CHECK (interval_days >= 0),
            reviews        INTEGER NOT NULL DEFAULT 0,
            lapses         INTEGER NOT NULL DEFAULT 0,
            last_reviewed  INTEGER NOT NULL,
            next_review    INTEGER NOT NULL,
            PRIMARY KEY (user_id, card_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_progress_due ON study_progress(user_id, next_review)",
        [],
    )?;

    // Create rating_submissions table for idempotency keys
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rating_submissions (
            user_id          INTEGER NOT NULL,
            idempotency_key  TEXT NOT NULL,
            card_id          INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            submitted_at     INTEGER NOT NULL,
            PRIMARY KEY (user_id, idempotency_key)
        )",
        [],
    )?;
    Ok(())
}

fn deck_exists(conn: &Connection, deck_id: DeckId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM decks WHERE id = ?1)",
        params![deck_id],
        |row| row.get(0),
    )
}

fn card_exists(conn: &Connection, card_id: CardId) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cards WHERE id = ?1)",
        params![card_id],
        |row| row.get(0),
    )
}

/// A foreign key failure on a progress write means the card is gone.
fn map_missing_card(err: rusqlite::Error, card_id: CardId) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
        {
            Error::CardNotFound(card_id)
        }
        other => other.into(),
    }
}

fn from_millis(millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, millis))
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Flashcard> {
    Ok(Flashcard {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        reading: row.get(4)?,
        created_at: from_millis(row.get(5)?)?,
    })
}

fn deck_from_row(row: &Row<'_>) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: from_millis(row.get(3)?)?,
        last_studied: row.get::<_, Option<i64>>(4)?.map(from_millis).transpose()?,
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewProgress> {
    Ok(ReviewProgress {
        user_id: row.get(0)?,
        card_id: row.get(1)?,
        ease: row.get(2)?,
        interval: row.get(3)?,
        reviews: row.get(4)?,
        lapses: row.get(5)?,
        last_reviewed: from_millis(row.get(6)?)?,
        next_review: from_millis(row.get(7)?)?,
    })
}

fn select_progress(
    conn: &Connection,
    user_id: UserId,
    card_id: CardId,
) -> rusqlite::Result<Option<ReviewProgress>> {
    conn.query_row(
        &format!("SELECT {PROGRESS_COLUMNS} FROM study_progress WHERE user_id = ?1 AND card_id = ?2"),
        params![user_id, card_id],
        progress_from_row,
    )
    .optional()
}

impl ProgressStore for SqliteStore {
    fn get_card(&self, card_id: CardId) -> Result<Option<Flashcard>> {
        let conn = self.lock();
        let card = conn
            .query_row(
                "SELECT id, deck_id, front, back, reading, created_at FROM cards WHERE id = ?1",
                params![card_id],
                card_from_row,
            )
            .optional()?;
        Ok(card)
    }

    fn get_deck(&self, deck_id: DeckId) -> Result<Option<Deck>> {
        let conn = self.lock();
        let deck = conn
            .query_row(
                "SELECT id, name, description, created_at, last_studied FROM decks WHERE id = ?1",
                params![deck_id],
                deck_from_row,
            )
            .optional()?;
        Ok(deck)
    }

    fn list_decks(&self) -> Result<Vec<Deck>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, last_studied FROM decks ORDER BY id",
        )?;
        let decks = stmt
            .query_map([], deck_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decks)
    }

    fn cards_by_deck(&self, deck_id: DeckId) -> Result<Vec<Flashcard>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, deck_id, front, back, reading, created_at
             FROM cards WHERE deck_id = ?1 ORDER BY id",
        )?;
        let cards = stmt
            .query_map(params![deck_id], card_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    fn get_progress(&self, user_id: UserId, card_id: CardId) -> Result<Option<ReviewProgress>> {
        let conn = self.lock();
        Ok(select_progress(&conn, user_id, card_id)?)
    }

    fn progress_for_cards(
        &self,
        user_id: UserId,
        card_ids: &[CardId],
    ) -> Result<HashMap<CardId, ReviewProgress>> {
        if card_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.lock();
        let mut records = HashMap::with_capacity(card_ids.len());
        // Stay well under SQLite's bound-parameter limit
        for chunk in card_ids.chunks(CARD_ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROGRESS_COLUMNS} FROM study_progress
                 WHERE user_id = ? AND card_id IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(
                params_from_iter(std::iter::once(user_id).chain(chunk.iter().copied())),
                progress_from_row,
            )?;
            for row in rows {
                let progress = row?;
                records.insert(progress.card_id, progress);
            }
        }
        Ok(records)
    }

    fn progress_for_user(&self, user_id: UserId) -> Result<Vec<ReviewProgress>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM study_progress WHERE user_id = ?1 ORDER BY card_id"
        ))?;
        let records = stmt
            .query_map(params![user_id], progress_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn upsert_progress(
        &self,
        previous: Option<&ReviewProgress>,
        next: &ReviewProgress,
        idempotency_key: Option<&str>,
    ) -> Result<ReviewProgress> {
        let conflict = || Error::ConcurrentUpdateConflict {
            user_id: next.user_id,
            card_id: next.card_id,
        };

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Insert only if the pair has no record yet, otherwise update only if
        // the stored review count is still the one the rating was based on
        let changed = match previous {
            None => tx.execute(
                &format!(
                    "INSERT INTO study_progress ({PROGRESS_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(user_id, card_id) DO NOTHING"
                ),
                params![
                    next.user_id,
                    next.card_id,
                    next.ease,
                    next.interval,
                    next.reviews,
                    next.lapses,
                    next.last_reviewed.timestamp_millis(),
                    next.next_review.timestamp_millis()
                ],
            ),
            Some(prev) => tx.execute(
                "UPDATE study_progress
                 SET ease = ?1, interval_days = ?2, reviews = ?3, lapses = ?4,
                     last_reviewed = ?5, next_review = ?6
                 WHERE user_id = ?7 AND card_id = ?8 AND reviews = ?9",
                params![
                    next.ease,
                    next.interval,
                    next.reviews,
                    next.lapses,
                    next.last_reviewed.timestamp_millis(),
                    next.next_review.timestamp_millis(),
                    next.user_id,
                    next.card_id,
                    prev.reviews
                ],
            ),
        }
        .map_err(|err| map_missing_card(err, next.card_id))?;

        if changed == 0 {
            // Dropping the transaction rolls back. A card deleted since the
            // read also takes its progress row with it.
            if !card_exists(&tx, next.card_id)? {
                return Err(Error::CardNotFound(next.card_id));
            }
            return Err(conflict());
        }

        // Record the idempotency key in the same transaction
        if let Some(key) = idempotency_key {
            let recorded = tx.execute(
                "INSERT INTO rating_submissions (user_id, idempotency_key, card_id, submitted_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, idempotency_key) DO NOTHING",
                params![
                    next.user_id,
                    key,
                    next.card_id,
                    next.last_reviewed.timestamp_millis()
                ],
            )?;
            if recorded == 0 {
                return Err(conflict());
            }
        }

        let stored = select_progress(&tx, next.user_id, next.card_id)?.ok_or_else(conflict)?;
        tx.commit()?;

        debug!(
            user_id = stored.user_id,
            card_id = stored.card_id,
            reviews = stored.reviews,
            interval = stored.interval,
            ease = stored.ease,
            "progress written"
        );
        Ok(stored)
    }

    fn find_submission(&self, user_id: UserId, key: &str) -> Result<Option<ReviewProgress>> {
        let conn = self.lock();
        let card_id: Option<CardId> = conn
            .query_row(
                "SELECT card_id FROM rating_submissions WHERE user_id = ?1 AND idempotency_key = ?2",
                params![user_id, key],
                |row| row.get(0),
            )
            .optional()?;

        match card_id {
            Some(card_id) => Ok(select_progress(&conn, user_id, card_id)?),
            None => Ok(None),
        }
    }

    fn restore_progress(&self, records: &[ReviewProgress]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut written = 0;
        for record in records {
            // Keep the stored record unless the backup has seen more reviews
            written += tx
                .execute(
                    &format!(
                        "INSERT INTO study_progress ({PROGRESS_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT(user_id, card_id) DO UPDATE SET
                             ease = excluded.ease,
                             interval_days = excluded.interval_days,
                             reviews = excluded.reviews,
                             lapses = excluded.lapses,
                             last_reviewed = excluded.last_reviewed,
                             next_review = excluded.next_review
                         WHERE excluded.reviews > study_progress.reviews"
                    ),
                    params![
                        record.user_id,
                        record.card_id,
                        record.ease,
                        record.interval,
                        record.reviews,
                        record.lapses,
                        record.last_reviewed.timestamp_millis(),
                        record.next_review.timestamp_millis()
                    ],
                )
                .map_err(|err| map_missing_card(err, record.card_id))?;
        }
        tx.commit()?;

        debug!(records = records.len(), written, "progress restored");
        Ok(written)
    }

    fn touch_deck(&self, deck_id: DeckId, studied_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE decks SET last_studied = ?1 WHERE id = ?2",
            params![studied_at.timestamp_millis(), deck_id],
        )?;
        Ok(())
    }
}
