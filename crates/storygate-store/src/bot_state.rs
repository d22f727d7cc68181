//! Key-value store for persistent bot state.
//!
//! Stores simple string key-value pairs in SQLite. Used to persist the
//! Telegram polling offset so updates are not reprocessed after a restart.

use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// Key under which the Telegram polling offset is stored.
pub const KEY_POLL_OFFSET: &str = "telegram_offset";

/// Persistent key-value store for bot state.
#[derive(Clone)]
pub struct BotStateStore {
    db: Database,
}

impl BotStateStore {
    /// Create a new bot state store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get a value by key, returning `None` if not found.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT value FROM bot_state WHERE key = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                );
                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Set a value for a key (insert or update).
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO bot_state (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![key, value],
                )?;
                debug!(key = %key, "bot state updated");
                Ok(())
            })
            .await
    }

    /// Get a value parsed as i64, returning `None` if not found or unparseable.
    pub async fn get_i64(&self, key: &str) -> StoreResult<Option<i64>> {
        let val = self.get(key).await?;
        Ok(val.and_then(|v| v.parse().ok()))
    }

    /// Set an i64 value.
    pub async fn set_i64(&self, key: &str, value: i64) -> StoreResult<()> {
        self.set(key, &value.to_string()).await
    }
}

// ── tests ────────────────────────────────────────────────────────────
