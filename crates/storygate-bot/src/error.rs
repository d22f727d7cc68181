//! Error types for the bot gateway.
//!
//! Every per-event failure is local: nothing in this taxonomy is fatal to
//! the process. `UserNotFound` is surfaced to the requesting reader as a
//! plain message by the dispatch loop.

use thiserror::Error;

use storygate_store::StoreError;

/// Alias for `Result<T, BotError>`.
pub type BotResult<T> = Result<T, BotError>;

/// Errors raised while handling a single inbound event.
#[derive(Debug, Error)]
pub enum BotError {
    /// The event referenced a reader with no record. Reported to the
    /// reader, never fatal.
    #[error("reader not found: {0}")]
    UserNotFound(i64),

    /// The storage layer failed.
    #[error("store error: {0}")]
    Store(StoreError),

    /// Telegram rejected an API call.
    #[error("telegram API error (code {code}): {description}")]
    Telegram { code: i64, description: String },

    /// The HTTP request to Telegram failed outright.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<StoreError> for BotError {
    fn from(err: StoreError) -> Self {
        // A missing reader row is a user-level condition, not a store fault.
        match err {
            StoreError::NotFound { id, .. } => Self::UserNotFound(id),
            other => Self::Store(other),
        }
    }
}
