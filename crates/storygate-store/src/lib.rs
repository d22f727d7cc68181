//! # storygate-store
//!
//! SQLite persistence for storygate.
//!
//! Provides the reader table (ids, referrers, referral counters, story
//! progress) and a small key-value table for bot-level state such as the
//! Telegram polling offset. All access goes through [`Database`], which
//! dispatches onto `spawn_blocking` so async callers never block on
//! SQLite I/O.

pub mod bot_state;
pub mod db;
pub mod error;
pub mod migration;
pub mod reader_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use bot_state::{BotStateStore, KEY_POLL_OFFSET};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use reader_store::{
    INITIAL_PROGRESS, REFERRAL_THRESHOLD, Reader, ReaderStore, ReferralOutcome, UNLOCKED_PROGRESS,
};
