//! Long-polling gateway loop.
//!
//! Polls Telegram for updates, turns each into an [`Event`], and routes
//! it to the progress controller. The polling offset is persisted after
//! every update so a restart never reprocesses messages. Transport
//! failures are logged and retried; no per-event failure stops the loop.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use storygate_catalog::{CONTINUE_CALLBACK, StoryCatalog};
use storygate_store::{BotStateStore, Database, KEY_POLL_OFFSET, ReaderStore};

use crate::config::BotConfig;
use crate::handlers::{StoryHandlers, user_facing_message};
use crate::telegram::TelegramClient;

/// One inbound event the controller knows how to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `/start [referral_arg]` command.
    Start {
        user_id: i64,
        username: String,
        referral_arg: Option<String>,
    },
    /// `/stats` command.
    Stats { user_id: i64 },
    /// Advance-button press.
    Continue { user_id: i64, callback_id: String },
    /// Inline share query.
    ShareQuery { user_id: i64, query_id: String },
}

/// Extract an [`Event`] from a raw Telegram update, if it is one we
/// handle. Unknown update shapes and unrelated messages yield `None`.
pub fn parse_event(update: &Value) -> Option<Event> {
    if let Some(cb) = update.get("callback_query") {
        let data = cb.get("data").and_then(|v| v.as_str())?;
        if data != CONTINUE_CALLBACK {
            return None;
        }
        return Some(Event::Continue {
            user_id: cb.pointer("/from/id").and_then(|v| v.as_i64())?,
            callback_id: cb.get("id").and_then(|v| v.as_str())?.to_string(),
        });
    }

    if let Some(iq) = update.get("inline_query") {
        return Some(Event::ShareQuery {
            user_id: iq.pointer("/from/id").and_then(|v| v.as_i64())?,
            query_id: iq.get("id").and_then(|v| v.as_str())?.to_string(),
        });
    }

    let message = update.get("message")?;
    let text = message.get("text").and_then(|v| v.as_str())?;
    let user_id = message.pointer("/from/id").and_then(|v| v.as_i64())?;
    let username = message
        .pointer("/from/username")
        .and_then(|v| v.as_str())
        .or_else(|| message.pointer("/from/first_name").and_then(|v| v.as_str()))
        .unwrap_or("reader")
        .to_string();

    let mut words = text.split_whitespace();
    // Some clients address commands to the bot: `/start@botname 42`.
    let command = words.next().map(|w| w.split('@').next().unwrap_or(w));
    match command {
        Some("/start") => Some(Event::Start {
            user_id,
            username,
            referral_arg: words.next().map(|s| s.to_string()),
        }),
        Some("/stats") => Some(Event::Stats { user_id }),
        _ => None,
    }
}

/// Run the gateway until the process is stopped.
pub async fn run(config: BotConfig, poll_timeout: u64) -> Result<()> {
    let client = TelegramClient::new(&config.token);

    // Verify the token before touching anything else.
    let bot_name = client
        .get_me()
        .await
        .context("failed to verify bot token with Telegram")?;

    if let Some(dir) = config.db_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir).context("failed to create data directory")?;
    }

    let db = Database::open_and_migrate(config.db_path.clone())
        .await
        .context("failed to open database")?;
    let readers = ReaderStore::new(db.clone());
    let bot_state = BotStateStore::new(db);

    let catalog = StoryCatalog::load(&config.story_path);
    let handlers = StoryHandlers::new(readers.clone(), catalog, client.clone(), &bot_name);

    println!();
    println!("  storygate v{}", env!("CARGO_PKG_VERSION"));
    println!("  Bot: @{bot_name}");
    println!("  Database: {}", config.db_path.display());
    println!("  Readers: {}", readers.count().await.unwrap_or(0));
    println!("  Long-poll timeout: {poll_timeout}s");
    println!();
    println!("  Bot is running. Press Ctrl+C to stop.");
    println!();

    // Restore the polling offset so restarts do not replay updates.
    let mut offset: i64 = bot_state
        .get_i64(KEY_POLL_OFFSET)
        .await
        .unwrap_or(None)
        .unwrap_or(0);
    if offset > 0 {
        info!(offset, "restored polling offset from database");
    }

    loop {
        let updates = match client.get_updates(offset, poll_timeout).await {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "poll failed, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in &updates {
            let update_id = update
                .get("update_id")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            offset = update_id + 1;

            // Persist before handling so a crash never replays this update.
            let _ = bot_state.set_i64(KEY_POLL_OFFSET, offset).await;

            let Some(event) = parse_event(update) else {
                continue;
            };
            dispatch(&handlers, &client, event).await;
        }
    }
}

/// Route one event to its handler and report user-level failures back to
/// the reader. Everything else is logged and dropped.
async fn dispatch(
    handlers: &StoryHandlers<TelegramClient>,
    client: &TelegramClient,
    event: Event,
) {
    info!(?event, "handling event");

    let (user_id, result) = match event {
        Event::Start {
            user_id,
            username,
            referral_arg,
        } => (
            user_id,
            handlers
                .handle_start(user_id, &username, referral_arg.as_deref())
                .await,
        ),
        Event::Stats { user_id } => (user_id, handlers.handle_stats(user_id).await),
        Event::Continue {
            user_id,
            callback_id,
        } => {
            // Dismiss the client spinner regardless of the outcome.
            if let Err(e) = client.answer_callback(&callback_id).await {
                warn!(user_id, error = %e, "failed to answer callback query");
            }
            (user_id, handlers.handle_continue(user_id).await)
        }
        Event::ShareQuery { user_id, query_id } => {
            (user_id, handlers.handle_share_query(user_id, &query_id).await)
        }
    };

    if let Err(err) = result {
        match user_facing_message(&err) {
            Some(msg) => {
                use crate::delivery::Delivery;
                if let Err(e) = client.send_text(user_id, msg, None).await {
                    warn!(user_id, error = %e, "failed to deliver error message");
                }
            }
            None => warn!(user_id, error = %err, "event handling failed"),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_start_without_arg() {
        let update = json!({
            "update_id": 1,
            "message": {
                "text": "/start",
                "from": { "id": 10, "username": "alice" },
                "chat": { "id": 10 },
            }
        });
        assert_eq!(
            parse_event(&update),
            Some(Event::Start {
                user_id: 10,
                username: "alice".to_string(),
                referral_arg: None,
            })
        );
    }

    #[test]
    fn parses_start_with_referral_arg() {
        let update = json!({
            "message": {
                "text": "/start 42",
                "from": { "id": 10, "first_name": "Alice" },
            }
        });
        assert_eq!(
            parse_event(&update),
            Some(Event::Start {
                user_id: 10,
                username: "Alice".to_string(),
                referral_arg: Some("42".to_string()),
            })
        );
    }

    #[test]
    fn parses_addressed_command_with_arg() {
        let update = json!({
            "message": {
                "text": "/start@storygatebot 42",
                "from": { "id": 10, "username": "alice" },
            }
        });
        assert_eq!(
            parse_event(&update),
            Some(Event::Start {
                user_id: 10,
                username: "alice".to_string(),
                referral_arg: Some("42".to_string()),
            })
        );
    }

    #[test]
    fn parses_addressed_stats() {
        let update = json!({
            "message": {
                "text": "/stats@storygatebot",
                "from": { "id": 10, "username": "alice" },
            }
        });
        assert_eq!(parse_event(&update), Some(Event::Stats { user_id: 10 }));
    }

    #[test]
    fn username_preferred_over_first_name() {
        let update = json!({
            "message": {
                "text": "/stats",
                "from": { "id": 10, "username": "alice", "first_name": "Alice" },
            }
        });
        assert_eq!(parse_event(&update), Some(Event::Stats { user_id: 10 }));
    }

    #[test]
    fn parses_continue_callback() {
        let update = json!({
            "callback_query": {
                "id": "cb-1",
                "data": "continue_story",
                "from": { "id": 10 },
            }
        });
        assert_eq!(
            parse_event(&update),
            Some(Event::Continue {
                user_id: 10,
                callback_id: "cb-1".to_string(),
            })
        );
    }

    #[test]
    fn ignores_foreign_callback_data() {
        let update = json!({
            "callback_query": {
                "id": "cb-1",
                "data": "something_else",
                "from": { "id": 10 },
            }
        });
        assert_eq!(parse_event(&update), None);
    }

    #[test]
    fn parses_inline_query() {
        let update = json!({
            "inline_query": {
                "id": "q-1",
                "query": "",
                "from": { "id": 10 },
            }
        });
        assert_eq!(
            parse_event(&update),
            Some(Event::ShareQuery {
                user_id: 10,
                query_id: "q-1".to_string(),
            })
        );
    }

    #[test]
    fn ignores_plain_chatter() {
        let update = json!({
            "message": {
                "text": "hello there",
                "from": { "id": 10 },
            }
        });
        assert_eq!(parse_event(&update), None);
    }

    #[test]
    fn ignores_messages_without_text() {
        let update = json!({
            "message": {
                "photo": [],
                "from": { "id": 10 },
            }
        });
        assert_eq!(parse_event(&update), None);
    }
}
