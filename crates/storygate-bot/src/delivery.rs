//! Outbound delivery seam.
//!
//! The progress controller never talks to Telegram directly — it emits
//! content through the [`Delivery`] trait. The real implementation lives
//! in [`crate::telegram`]; tests use a recording fake.

use async_trait::async_trait;

use crate::error::BotResult;

/// What pressing a button does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Deliver a callback tag back to the bot.
    Callback(String),
    /// Open the inline-share prompt pre-filled with a message.
    SwitchInlineQuery(String),
}

/// A single inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

/// An inline keyboard: rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// A one-button keyboard firing a callback.
    pub fn callback(label: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            rows: vec![vec![Button {
                label: label.into(),
                action: ButtonAction::Callback(tag.into()),
            }]],
        }
    }

    /// A one-button keyboard opening the inline-share prompt.
    pub fn share(label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            rows: vec![vec![Button {
                label: label.into(),
                action: ButtonAction::SwitchInlineQuery(query.into()),
            }]],
        }
    }
}

/// Outbound messaging operations the controller depends on.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Send a text message, optionally with an inline keyboard.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()>;

    /// Send a photo with a caption, optionally with an inline keyboard.
    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()>;

    /// Send an audio clip as its own message.
    async fn send_audio(&self, chat_id: i64, audio: &str) -> BotResult<()>;

    /// Answer an inline query with a single shareable article.
    async fn answer_inline(&self, query_id: &str, title: &str, message: &str) -> BotResult<()>;
}
