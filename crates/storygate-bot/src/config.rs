//! Runtime configuration.
//!
//! The bot token comes from the environment (never from source — the
//! token identifies the deployment, not the program). Paths have working
//! defaults so `storygate run` works from a fresh checkout with only
//! `TELEGRAM_BOT_TOKEN` set, optionally via a `.env` file.

use std::path::PathBuf;

use anyhow::Result;

/// Environment variable holding the bot token.
pub const ENV_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// Environment variable overriding the database path.
pub const ENV_DB_PATH: &str = "STORYGATE_DB";

/// Environment variable overriding the story content file.
pub const ENV_STORY_PATH: &str = "STORYGATE_STORY";

/// Settings resolved from the environment.
pub struct BotConfig {
    /// Telegram bot token.
    pub token: String,
    /// SQLite database location.
    pub db_path: PathBuf,
    /// Story catalog TOML override (built-in content if absent).
    pub story_path: PathBuf,
}

impl BotConfig {
    /// Resolve configuration from the environment.
    ///
    /// Loads `.env` first if present. Fails only when the token is
    /// missing.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = env_non_empty(ENV_TOKEN).ok_or_else(|| {
            anyhow::anyhow!("{ENV_TOKEN} is required. Create a bot at https://t.me/BotFather")
        })?;

        Ok(Self {
            token,
            db_path: env_non_empty(ENV_DB_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/storygate.db")),
            story_path: env_non_empty(ENV_STORY_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/story.toml")),
        })
    }
}

/// Read an environment variable, treating empty values as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
