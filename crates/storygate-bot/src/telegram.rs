//! Telegram Bot API client.
//!
//! Thin JSON-over-HTTP wrapper: every method call is POSTed to
//! `{BASE_URL}{token}/{method}` and the response's `ok` field decides
//! success. Implements [`Delivery`] for the progress controller and adds
//! the inbound-side calls the polling loop needs (`getMe`, `getUpdates`,
//! `answerCallbackQuery`).

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::delivery::{Button, ButtonAction, Delivery, Keyboard};
use crate::error::{BotError, BotResult};

/// Telegram Bot API base URL.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";

/// Authenticated client for one bot token.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
}

impl TelegramClient {
    /// Create a client for `token`.
    pub fn new(token: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("storygate/0.1")
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_base: format!("{TELEGRAM_API_BASE}{token}"),
        }
    }

    /// Build a full API URL for the given method.
    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// POST a method call and return the `result` payload.
    async fn call(&self, method: &str, body: Value) -> BotResult<Value> {
        let url = self.method_url(method);
        debug!(method, "telegram API call");

        let response: Value = self.http.post(&url).json(&body).send().await?.json().await?;
        Self::parse_response(response)
    }

    /// Check the `ok` field of a Bot API response.
    ///
    /// Telegram responses follow the format `{ "ok": true, "result": ... }`
    /// on success, or `{ "ok": false, "error_code": 400, "description": "..." }`
    /// on failure.
    fn parse_response(response: Value) -> BotResult<Value> {
        let ok = response
            .get("ok")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !ok {
            let code = response
                .get("error_code")
                .and_then(|v| v.as_i64())
                .unwrap_or(-1);
            let description = response
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(BotError::Telegram { code, description });
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    // ── inbound side ─────────────────────────────────────────────────

    /// Verify the token and return the bot's username.
    pub async fn get_me(&self) -> BotResult<String> {
        let result = self.call("getMe", json!({})).await?;
        Ok(result
            .get("username")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string())
    }

    /// Long-poll for updates starting at `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> BotResult<Vec<Value>> {
        let result = self
            .call(
                "getUpdates",
                json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query", "inline_query"],
                }),
            )
            .await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// Acknowledge a callback query (dismisses the client's spinner).
    pub async fn answer_callback(&self, callback_query_id: &str) -> BotResult<()> {
        self.call(
            "answerCallbackQuery",
            json!({ "callback_query_id": callback_query_id }),
        )
        .await?;
        Ok(())
    }
}

/// Convert a [`Keyboard`] into Telegram `reply_markup` JSON.
fn reply_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| row.iter().map(button_json).collect())
        .collect();
    json!({ "inline_keyboard": rows })
}

fn button_json(button: &Button) -> Value {
    match &button.action {
        ButtonAction::Callback(tag) => json!({
            "text": button.label,
            "callback_data": tag,
        }),
        ButtonAction::SwitchInlineQuery(query) => json!({
            "text": button.label,
            "switch_inline_query": query,
        }),
    }
}

// ── Delivery implementation ──────────────────────────────────────────

#[async_trait]
impl Delivery for TelegramClient {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = reply_markup(kb);
        }
        self.call("sendMessage", body).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "photo": photo,
            "caption": caption,
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = reply_markup(kb);
        }
        self.call("sendPhoto", body).await?;
        Ok(())
    }

    async fn send_audio(&self, chat_id: i64, audio: &str) -> BotResult<()> {
        self.call(
            "sendAudio",
            json!({
                "chat_id": chat_id,
                "audio": audio,
            }),
        )
        .await?;
        Ok(())
    }

    async fn answer_inline(&self, query_id: &str, title: &str, message: &str) -> BotResult<()> {
        // A single article result; the id only needs to be unique within
        // this answer.
        self.call(
            "answerInlineQuery",
            json!({
                "inline_query_id": query_id,
                "results": [{
                    "type": "article",
                    "id": "share-link",
                    "title": title,
                    "input_message_content": { "message_text": message },
                }],
            }),
        )
        .await?;
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
