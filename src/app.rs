//! Terminal front end: command handlers and the interactive study loop.

use std::io::{self, BufRead, Write};

use chrono::{DateTime, Utc};
use flashcards_app::database::{ProgressStore, SqliteStore};
use flashcards_app::export::json::export_progress_to_path;
use flashcards_app::models::scheduler::{format_interval, preview_intervals};
use flashcards_app::models::{DeckId, UserId};
use flashcards_app::{Rating, RatingRequest, ReviewService};

use crate::Commands;

pub struct RunOptions {
    pub user_id: UserId,
    /// Fixed "now"; the clock is read per action when unset.
    pub now: Option<DateTime<Utc>>,
}

impl RunOptions {
    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

const SAMPLE_DECK: &str = "Japanese Basics";
const SAMPLE_CARDS: [(&str, &str, &str); 3] = [
    ("猫", "cat", "ねこ"),
    ("水", "water", "みず"),
    ("ありがとう", "thank you", "ありがとう"),
];

pub fn run(
    command: Commands,
    service: &ReviewService<SqliteStore>,
    options: &RunOptions,
) -> anyhow::Result<()> {
    let store = service.store();
    match command {
        Commands::Init => {
            if store.list_decks()?.is_empty() {
                let deck = store.add_deck(SAMPLE_DECK, Some("Sample vocabulary"))?;
                for (front, back, reading) in SAMPLE_CARDS {
                    store.add_card(deck.id, front, back, Some(reading))?;
                }
                println!("Sample deck '{}' created (id {}).", deck.name, deck.id);
            } else {
                println!("Database already initialized.");
            }
        }
        Commands::AddDeck { name, description } => {
            let deck = store.add_deck(&name, description.as_deref())?;
            println!("Deck '{}' created with id {}.", deck.name, deck.id);
        }
        Commands::AddCard {
            deck,
            front,
            back,
            reading,
        } => {
            let card = store.add_card(deck, &front, &back, reading.as_deref())?;
            println!("Card {} added: {} = {}", card.id, card.front, card.back);
        }
        Commands::Decks { due_only } => {
            let summaries = service.deck_due_summaries(options.user_id, due_only, options.now())?;
            if summaries.is_empty() {
                println!("No decks.");
            }
            for summary in summaries {
                let last = summary
                    .deck
                    .last_studied
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:>4}  {:<30} due: {:>3}  last studied: {}",
                    summary.deck.id, summary.deck.name, summary.due_count, last
                );
            }
        }
        Commands::Due { decks } => {
            let deck_ids = resolve_decks(service, decks)?;
            let due = service.get_due_cards_at(options.user_id, &deck_ids, options.now())?;
            println!("{} cards due", due.len());
            for card_id in due {
                if let Some(card) = store.get_card(card_id)? {
                    println!("{:>6}  {}", card.id, card.front);
                }
            }
        }
        Commands::Rate {
            card,
            rating,
            idempotency_key,
        } => {
            let rating: Rating = rating.parse()?;
            let mut request = RatingRequest::new(options.user_id, card, rating);
            request.idempotency_key = idempotency_key;
            match service.submit_rating(&request, options.now()) {
                Ok(progress) => println!(
                    "Saved. Next review in {} ({} reviews, {} lapses, ease {}%).",
                    format_interval(progress.interval),
                    progress.reviews,
                    progress.lapses,
                    progress.ease
                ),
                Err(err) => {
                    eprintln!("{}", err.user_message());
                    return Err(err.into());
                }
            }
        }
        Commands::Study { decks } => {
            let deck_ids = resolve_decks(service, decks)?;
            let stdin = io::stdin();
            study(service, options, deck_ids, &mut stdin.lock())?;
        }
        Commands::Stats => {
            let stats = service.user_stats(options.user_id)?;
            println!("Total reviews: {}", stats.total_reviews);
            println!("Lapses:        {}", stats.total_lapses);
            println!("Cards studied: {}", stats.cards_studied);
            println!("Accuracy:      {}%", stats.accuracy);
            if let Some(last) = stats.last_studied {
                println!("Last studied:  {}", last.format("%Y-%m-%d %H:%M"));
            }
        }
        Commands::Export { path } => {
            let count = export_progress_to_path(store, options.user_id, &path)?;
            println!("Exported {} records to '{}'.", count, path);
        }
        Commands::Import { path } => {
            let count = service.import_progress(&path)?;
            println!("Restored {} records from '{}'.", count, path);
        }
    }
    Ok(())
}

/// All decks when none were named on the command line.
fn resolve_decks(
    service: &ReviewService<SqliteStore>,
    decks: Vec<DeckId>,
) -> anyhow::Result<Vec<DeckId>> {
    if !decks.is_empty() {
        return Ok(decks);
    }
    Ok(service.store().list_decks()?.into_iter().map(|d| d.id).collect())
}

fn prompt(input: &mut impl BufRead, message: &str) -> io::Result<Option<String>> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Presents each due card once. A failed save keeps the card current so the
/// rating can be retried.
fn study(
    service: &ReviewService<SqliteStore>,
    options: &RunOptions,
    deck_ids: Vec<DeckId>,
    input: &mut impl BufRead,
) -> anyhow::Result<()> {
    let mut session = service.start_session(options.user_id, deck_ids, options.now())?;
    if session.is_completed() {
        println!("Nothing due. Come back later!");
        return Ok(());
    }

    while let Some(card_id) = session.current() {
        let Some(card) = service.store().get_card(card_id)? else {
            // Deleted since the session started.
            session.skip(card_id);
            continue;
        };

        println!();
        println!("{}", session.phase_message());
        println!("  {}", card.front);
        if prompt(input, "  [enter] to show answer, q to quit ")?.is_none_or(|s| s == "q") {
            break;
        }
        match &card.reading {
            Some(reading) => println!("  {} ({})", card.back, reading),
            None => println!("  {}", card.back),
        }

        let existing = service.store().get_progress(options.user_id, card_id)?;
        let [again, hard, good, easy] = preview_intervals(existing.as_ref(), service.config());
        let choices = format!(
            "  1 again ({})  2 hard ({})  3 good ({})  4 easy ({}) > ",
            format_interval(again),
            format_interval(hard),
            format_interval(good),
            format_interval(easy)
        );

        let Some(answer) = prompt(input, &choices)? else {
            break;
        };
        let rating: Rating = match answer.parse() {
            Ok(rating) => rating,
            Err(err) => {
                println!("  {err}");
                continue;
            }
        };

        match service.rate_current(&mut session, rating, options.now()) {
            Ok(Some(progress)) => {
                println!("  next review in {}", format_interval(progress.interval))
            }
            Ok(None) => break,
            Err(err) if err.is_retryable() => println!("  {}", err.user_message()),
            Err(err) => return Err(err.into()),
        }
    }

    println!();
    println!(
        "{} reviewed ({} again), {} remaining.",
        session.completed_count(),
        session.count_rated(Rating::Again),
        session.remaining_count()
    );
    Ok(())
}
