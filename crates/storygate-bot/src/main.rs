//! CLI entry point for storygate.
//!
//! Provides the `storygate` command with subcommands for running the
//! Telegram gateway and inspecting the local database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod bot;
mod config;
mod delivery;
mod error;
mod handlers;
mod messages;
mod telegram;

use config::BotConfig;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// storygate — a referral-gated story bot for Telegram.
#[derive(Parser)]
#[command(
    name = "storygate",
    version,
    about = "storygate — referral-gated story bot",
    long_about = "A Telegram bot that serializes a story and unlocks it once a \
                  reader has invited two friends."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram gateway (long-polling).
    Run {
        /// Telegram long-polling timeout in seconds.
        #[arg(long, default_value_t = 30)]
        poll_timeout: u64,
    },

    /// Show reader totals from the local database.
    Status,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { poll_timeout } => {
            let config = BotConfig::from_env()?;
            bot::run(config, poll_timeout).await
        }
        Commands::Status => cmd_status().await,
    }
}

/// Initialize the tracing subscriber, honoring `RUST_LOG` when set.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status() -> Result<()> {
    dotenvy::dotenv().ok();

    let db_path = config::env_non_empty(config::ENV_DB_PATH)
        .unwrap_or_else(|| "data/storygate.db".to_string());

    if !std::path::Path::new(&db_path).exists() {
        println!("No database at {db_path} — the bot has not run yet.");
        return Ok(());
    }

    let db = storygate_store::Database::open_and_migrate(std::path::PathBuf::from(&db_path))
        .await
        .context("failed to open database")?;
    let readers = storygate_store::ReaderStore::new(db.clone());
    let state = storygate_store::BotStateStore::new(db);

    println!("Database: {db_path}");
    println!("Readers:  {}", readers.count().await?);
    println!(
        "Offset:   {}",
        state
            .get_i64(storygate_store::KEY_POLL_OFFSET)
            .await?
            .unwrap_or(0)
    );
    Ok(())
}
