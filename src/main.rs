//! `flashcards`: study Japanese vocabulary decks from the terminal.
//!
//! Subcommands:
//! - `init`: create the database and a sample deck
//! - `add-deck` / `add-card`: minimal seeding
//! - `decks` / `due`: what is due now
//! - `rate` / `study`: apply ratings
//! - `stats`, `export`, `import`

mod app;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use flashcards_app::database::SqliteStore;
use flashcards_app::{AppConfig, ReviewService};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flashcards")]
#[command(about = "Spaced-repetition study for Japanese vocabulary", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "FLASHCARDS_CONFIG")]
    config: Option<String>,

    /// User studying (defaults to the configured user)
    #[arg(long)]
    user: Option<i64>,

    /// Treat this RFC 3339 time as "now" instead of the clock
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database, with a sample deck if it is empty
    Init,

    /// Create a deck
    AddDeck {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Add a card to a deck
    AddCard {
        #[arg(long)]
        deck: i64,
        front: String,
        back: String,
        /// Kana reading of the front
        #[arg(long)]
        reading: Option<String>,
    },

    /// List decks with their due counts
    Decks {
        /// Only show decks that have due cards
        #[arg(long)]
        due_only: bool,
    },

    /// List due cards (all decks when none are given)
    Due {
        #[arg(long = "deck")]
        decks: Vec<i64>,
    },

    /// Rate a single card: again, hard, good or easy
    Rate {
        card: i64,
        rating: String,
        /// Key making a retried submission count once
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Interactive study session over the due cards
    Study {
        #[arg(long = "deck")]
        decks: Vec<i64>,
    },

    /// Review statistics for the user
    Stats,

    /// Write the user's progress to a JSON file
    Export { path: String },

    /// Restore progress from a JSON file
    Import { path: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!(
            "failed to open database at {}",
            config.database_path.display()
        )
    })?;
    let service = ReviewService::new(store, config.scheduler.clone())?;

    let options = app::RunOptions {
        user_id: cli.user.unwrap_or(config.user_id),
        now: cli.now,
    };
    info!(user_id = options.user_id, "starting");

    app::run(cli.command, &service, &options)
}
