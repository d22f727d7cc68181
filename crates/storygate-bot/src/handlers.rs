//! Progress controller: the only stateful decision logic in the bot.
//!
//! Each inbound event (start, continue button, stats, inline share) maps
//! to one handler. Handlers read and write the reader store, look up the
//! story catalog by the resulting progress level, and emit content through
//! the injected [`Delivery`] implementation. No handler is fatal: a
//! missing reader surfaces as [`BotError::UserNotFound`] for the dispatch
//! loop to report.

use tracing::{debug, info, warn};

use storygate_catalog::{StoryCatalog, StoryPart};
use storygate_store::{ReaderStore, ReferralOutcome, UNLOCKED_PROGRESS};

use crate::delivery::{Delivery, Keyboard};
use crate::error::{BotError, BotResult};
use crate::messages;

/// Event handlers bound to a store, a catalog, and a delivery adapter.
pub struct StoryHandlers<D> {
    readers: ReaderStore,
    catalog: StoryCatalog,
    delivery: D,
    bot_username: String,
}

impl<D: Delivery> StoryHandlers<D> {
    pub fn new(
        readers: ReaderStore,
        catalog: StoryCatalog,
        delivery: D,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            readers,
            catalog,
            delivery,
            bot_username: bot_username.into(),
        }
    }

    /// The referral deep link readers share: `/start=<their id>`.
    pub fn referral_link(&self, user_id: i64) -> String {
        format!("https://t.me/{}?start={}", self.bot_username, user_id)
    }

    /// Handle `/start [referral_arg]`.
    ///
    /// Registers the reader on first contact, credits the referrer when a
    /// valid foreign id was supplied, and always replies with a greeting,
    /// the share keyboard, and part 1. Part 1 has no advance button —
    /// progression past it is referral-gated only.
    pub async fn handle_start(
        &self,
        user_id: i64,
        username: &str,
        referral_arg: Option<&str>,
    ) -> BotResult<()> {
        // Non-numeric, non-positive, or self-referring arguments are
        // silently treated as "no referral".
        let referral_id = parse_referral_arg(referral_arg).filter(|&id| id != user_id);

        let created = self
            .readers
            .create_if_absent(user_id, Some(username), referral_id)
            .await?;

        if created {
            info!(user_id, ?referral_id, "new reader registered");
            if let Some(referrer_id) = referral_id {
                self.credit_referral(referrer_id).await?;
            }
        }

        self.delivery
            .send_text(user_id, &messages::greeting(username), None)
            .await?;

        let link = self.referral_link(user_id);
        let share = Keyboard::share(messages::SHARE_BUTTON, link);
        self.send_part(user_id, self.catalog.part(1), Some(&share))
            .await
    }

    /// Handle a press of the advance button.
    ///
    /// Advances progress by one level. A level past the written catalog
    /// gets the fixed finished acknowledgment instead of the terminal
    /// entry's generic text; the terminal state is absorbing.
    pub async fn handle_continue(&self, user_id: i64) -> BotResult<()> {
        let new_level = self.readers.advance_progress(user_id).await?;
        debug!(user_id, new_level, "reader advanced");

        if !self.catalog.contains(new_level) {
            return self
                .delivery
                .send_text(user_id, messages::STORY_FINISHED, None)
                .await;
        }

        self.send_part(user_id, self.catalog.part(new_level), None)
            .await
    }

    /// Handle `/stats`: referral count and story progress, read-only.
    pub async fn handle_stats(&self, user_id: i64) -> BotResult<()> {
        let (referrals, progress) = self.readers.stats(user_id).await?;
        self.delivery
            .send_text(user_id, &messages::stats(referrals, progress), None)
            .await
    }

    /// Handle an inline share query. Pure: no store interaction.
    pub async fn handle_share_query(&self, user_id: i64, query_id: &str) -> BotResult<()> {
        let link = self.referral_link(user_id);
        self.delivery
            .answer_inline(query_id, messages::SHARE_TITLE, &messages::share_message(&link))
            .await
    }

    // ── internals ────────────────────────────────────────────────────

    /// Credit a referral and, when it unlocks the story, push part 2 to
    /// the referrer. The unlock fires at most once per referrer — the
    /// store's compare-and-set guarantees it even for racing referrals.
    async fn credit_referral(&self, referrer_id: i64) -> BotResult<()> {
        match self.readers.record_referral(referrer_id).await? {
            ReferralOutcome::UnknownReferrer => {
                warn!(referrer_id, "referral argument pointed at an unknown reader");
                Ok(())
            }
            ReferralOutcome::Counted { referrals } => {
                debug!(referrer_id, referrals, "referral counted");
                Ok(())
            }
            ReferralOutcome::Unlocked { referrals } => {
                info!(referrer_id, referrals, "referral threshold reached, story unlocked");
                self.send_part(referrer_id, self.catalog.part(UNLOCKED_PROGRESS), None)
                    .await
            }
        }
    }

    /// Emit one story part: text (as a photo caption when a photo is
    /// attached) with its advance button, then any audio as a separate
    /// message. Audio delivery failures are logged and swallowed — the
    /// clip is garnish, not the story.
    async fn send_part(
        &self,
        chat_id: i64,
        part: &StoryPart,
        extra_keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        let keyboard = part
            .button
            .as_ref()
            .map(|b| Keyboard::callback(b.label.clone(), b.callback.clone()));
        let keyboard = keyboard.as_ref().or(extra_keyboard);

        match &part.photo {
            Some(photo) => {
                self.delivery
                    .send_photo(chat_id, photo, &part.text, keyboard)
                    .await?
            }
            None => self.delivery.send_text(chat_id, &part.text, keyboard).await?,
        }

        if let Some(audio) = &part.audio
            && let Err(e) = self.delivery.send_audio(chat_id, audio).await
        {
            warn!(chat_id, audio = %audio, error = %e, "audio delivery failed, continuing");
        }

        Ok(())
    }
}

/// Parse an optional referral argument into a positive reader id.
fn parse_referral_arg(arg: Option<&str>) -> Option<i64> {
    arg.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|&id| id > 0)
}

/// Map a handler error to the plain message shown to the reader, if any.
pub fn user_facing_message(err: &BotError) -> Option<&'static str> {
    match err {
        BotError::UserNotFound(_) => Some(messages::NOT_REGISTERED),
        _ => None,
    }
}

// ── tests ────────────────────────────────────────────────────────────
