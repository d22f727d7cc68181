//! Reader persistence for storygate.
//!
//! A reader is one Telegram user working through the story. The row keeps
//! two counters: how many new readers they have referred and how far they
//! have progressed. Both only ever increase. The referral bookkeeping runs
//! inside a single transaction so two referrals landing at the same time
//! cannot unlock the story twice.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// Number of referrals required to unlock the story past part 1.
pub const REFERRAL_THRESHOLD: u32 = 2;

/// Story level every new reader starts at.
pub const INITIAL_PROGRESS: u32 = 1;

/// Story level granted when the referral threshold is reached.
pub const UNLOCKED_PROGRESS: u32 = 2;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A reader record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reader {
    /// Telegram user id. Immutable once created.
    pub id: i64,
    /// Display name, if the platform supplied one.
    pub username: Option<String>,
    /// Id of the reader who referred this one, if any.
    pub referral_id: Option<i64>,
    /// Count of successful referrals attributed to this reader.
    pub referrals_count: u32,
    /// Current story level (index into the catalog).
    pub story_progress: u32,
    /// Unix timestamp when the row was created.
    pub created_at: i64,
}

/// Result of crediting a referral to a referrer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// The referrer id does not exist; nothing was recorded.
    UnknownReferrer,
    /// The referral was counted but the story stays locked.
    Counted { referrals: u32 },
    /// This referral reached the threshold and moved the referrer from
    /// part 1 to part 2. Fires at most once per referrer.
    Unlocked { referrals: u32 },
}

// ═══════════════════════════════════════════════════════════════════════
//  ReaderStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD and state-transition operations on reader records.
#[derive(Clone)]
pub struct ReaderStore {
    db: Database,
}

impl ReaderStore {
    /// Create a new reader store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a reader if they are not already known.
    ///
    /// Returns `true` if a new row was inserted. An existing row is left
    /// untouched — re-running `/start` never resets progress or changes
    /// the recorded referrer.
    #[instrument(skip(self))]
    pub async fn create_if_absent(
        &self,
        id: i64,
        username: Option<&str>,
        referral_id: Option<i64>,
    ) -> StoreResult<bool> {
        let username = username.map(|s| s.to_string());
        let now = Utc::now().timestamp();

        let inserted = self
            .db
            .execute(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO readers (id, username, referral_id, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id, username, referral_id, now],
                )?;
                Ok(n > 0)
            })
            .await?;

        if inserted {
            debug!(reader_id = id, "reader registered");
        }
        Ok(inserted)
    }

    /// Fetch a single reader by id, returning `None` if not found.
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> StoreResult<Option<Reader>> {
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, username, referral_id, referrals_count, story_progress, created_at \
                     FROM readers WHERE id = ?1",
                    rusqlite::params![id],
                    map_reader,
                );
                match result {
                    Ok(reader) => Ok(Some(reader)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Credit one referral to `referrer_id` and apply the unlock rule.
    ///
    /// The whole sequence — increment, re-read, compare-and-set of
    /// `story_progress` — runs in one transaction. The CAS
    /// (`WHERE story_progress = 1`) makes the 1→2 jump idempotent: once a
    /// referrer has been unlocked, later referrals only bump the counter.
    #[instrument(skip(self))]
    pub async fn record_referral(&self, referrer_id: i64) -> StoreResult<ReferralOutcome> {
        let outcome = self
            .db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let updated = tx.execute(
                    "UPDATE readers SET referrals_count = referrals_count + 1 WHERE id = ?1",
                    rusqlite::params![referrer_id],
                )?;
                if updated == 0 {
                    // No row to credit; nothing to commit.
                    return Ok(ReferralOutcome::UnknownReferrer);
                }

                let referrals: u32 = tx.query_row(
                    "SELECT referrals_count FROM readers WHERE id = ?1",
                    rusqlite::params![referrer_id],
                    |row| row.get(0),
                )?;

                let outcome = if referrals >= REFERRAL_THRESHOLD {
                    let jumped = tx.execute(
                        "UPDATE readers SET story_progress = ?1 \
                         WHERE id = ?2 AND story_progress = ?3",
                        rusqlite::params![UNLOCKED_PROGRESS, referrer_id, INITIAL_PROGRESS],
                    )?;
                    if jumped > 0 {
                        ReferralOutcome::Unlocked { referrals }
                    } else {
                        ReferralOutcome::Counted { referrals }
                    }
                } else {
                    ReferralOutcome::Counted { referrals }
                };

                tx.commit()?;
                Ok(outcome)
            })
            .await?;

        debug!(referrer_id, ?outcome, "referral recorded");
        Ok(outcome)
    }

    /// Advance a reader's story progress by one level.
    ///
    /// Returns the new level. Fails with [`StoreError::NotFound`] if the
    /// reader does not exist; in that case nothing is written.
    #[instrument(skip(self))]
    pub async fn advance_progress(&self, id: i64) -> StoreResult<u32> {
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                let updated = tx.execute(
                    "UPDATE readers SET story_progress = story_progress + 1 WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "reader",
                        id,
                    });
                }

                let new_level: u32 = tx.query_row(
                    "SELECT story_progress FROM readers WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )?;

                tx.commit()?;
                Ok(new_level)
            })
            .await
    }

    /// Return `(referrals_count, story_progress)` for display.
    ///
    /// Fails with [`StoreError::NotFound`] if the reader does not exist.
    #[instrument(skip(self))]
    pub async fn stats(&self, id: i64) -> StoreResult<(u32, u32)> {
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT referrals_count, story_progress FROM readers WHERE id = ?1",
                    rusqlite::params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                );
                match result {
                    Ok(pair) => Ok(pair),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound {
                        entity: "reader",
                        id,
                    }),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Return the total number of readers.
    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM readers", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Row mapping
// ═══════════════════════════════════════════════════════════════════════

fn map_reader(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reader> {
    Ok(Reader {
        id: row.get(0)?,
        username: row.get(1)?,
        referral_id: row.get(2)?,
        referrals_count: row.get(3)?,
        story_progress: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> ReaderStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        ReaderStore::new(db)
    }

    #[tokio::test]
    async fn create_and_get_reader() {
        let store = setup_store().await;

        let created = store
            .create_if_absent(100, Some("alice"), None)
            .await
            .unwrap();
        assert!(created);

        let reader = store.get(100).await.unwrap().unwrap();
        assert_eq!(reader.id, 100);
        assert_eq!(reader.username.as_deref(), Some("alice"));
        assert_eq!(reader.referral_id, None);
        assert_eq!(reader.referrals_count, 0);
        assert_eq!(reader.story_progress, INITIAL_PROGRESS);
        assert!(reader.created_at > 0);
    }

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let store = setup_store().await;
        assert!(store.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_is_idempotent_and_preserves_state() {
        let store = setup_store().await;

        assert!(store.create_if_absent(100, Some("alice"), None).await.unwrap());
        store.advance_progress(100).await.unwrap();

        // A second /start must not reset anything or adopt a new referrer.
        let created = store
            .create_if_absent(100, Some("renamed"), Some(7))
            .await
            .unwrap();
        assert!(!created);

        let reader = store.get(100).await.unwrap().unwrap();
        assert_eq!(reader.username.as_deref(), Some("alice"));
        assert_eq!(reader.referral_id, None);
        assert_eq!(reader.story_progress, 2);
    }

    #[tokio::test]
    async fn referral_id_is_recorded() {
        let store = setup_store().await;

        store.create_if_absent(1, Some("ref"), None).await.unwrap();
        store.create_if_absent(2, Some("new"), Some(1)).await.unwrap();

        let reader = store.get(2).await.unwrap().unwrap();
        assert_eq!(reader.referral_id, Some(1));
    }

    #[tokio::test]
    async fn first_referral_counts_without_unlock() {
        let store = setup_store().await;
        store.create_if_absent(1, None, None).await.unwrap();

        let outcome = store.record_referral(1).await.unwrap();
        assert_eq!(outcome, ReferralOutcome::Counted { referrals: 1 });

        let reader = store.get(1).await.unwrap().unwrap();
        assert_eq!(reader.referrals_count, 1);
        assert_eq!(reader.story_progress, INITIAL_PROGRESS);
    }

    #[tokio::test]
    async fn second_referral_unlocks() {
        let store = setup_store().await;
        store.create_if_absent(1, None, None).await.unwrap();

        store.record_referral(1).await.unwrap();
        let outcome = store.record_referral(1).await.unwrap();
        assert_eq!(outcome, ReferralOutcome::Unlocked { referrals: 2 });

        let reader = store.get(1).await.unwrap().unwrap();
        assert_eq!(reader.referrals_count, 2);
        assert_eq!(reader.story_progress, UNLOCKED_PROGRESS);
    }

    #[tokio::test]
    async fn third_referral_does_not_unlock_again() {
        let store = setup_store().await;
        store.create_if_absent(1, None, None).await.unwrap();

        store.record_referral(1).await.unwrap();
        store.record_referral(1).await.unwrap();
        let outcome = store.record_referral(1).await.unwrap();
        assert_eq!(outcome, ReferralOutcome::Counted { referrals: 3 });

        let reader = store.get(1).await.unwrap().unwrap();
        assert_eq!(reader.referrals_count, 3);
        assert_eq!(reader.story_progress, UNLOCKED_PROGRESS);
    }

    #[tokio::test]
    async fn referrals_after_manual_progress_never_jump() {
        let store = setup_store().await;
        store.create_if_absent(1, None, None).await.unwrap();

        // Reader unlocked and read ahead.
        store.record_referral(1).await.unwrap();
        store.record_referral(1).await.unwrap();
        store.advance_progress(1).await.unwrap();

        let outcome = store.record_referral(1).await.unwrap();
        assert_eq!(outcome, ReferralOutcome::Counted { referrals: 3 });

        let reader = store.get(1).await.unwrap().unwrap();
        assert_eq!(reader.story_progress, 3);
    }

    #[tokio::test]
    async fn unknown_referrer_records_nothing() {
        let store = setup_store().await;

        let outcome = store.record_referral(404).await.unwrap();
        assert_eq!(outcome, ReferralOutcome::UnknownReferrer);
        assert!(store.get(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn advance_progress_increments() {
        let store = setup_store().await;
        store.create_if_absent(1, None, None).await.unwrap();

        assert_eq!(store.advance_progress(1).await.unwrap(), 2);
        assert_eq!(store.advance_progress(1).await.unwrap(), 3);

        let reader = store.get(1).await.unwrap().unwrap();
        assert_eq!(reader.story_progress, 3);
    }

    #[tokio::test]
    async fn advance_progress_unknown_reader() {
        let store = setup_store().await;

        let result = store.advance_progress(404).await;
        match result.unwrap_err() {
            StoreError::NotFound { entity, id } => {
                assert_eq!(entity, "reader");
                assert_eq!(id, 404);
            }
            other => panic!("expected NotFound, got: {other}"),
        }
    }

    #[tokio::test]
    async fn stats_reflect_counters() {
        let store = setup_store().await;
        store.create_if_absent(1, None, None).await.unwrap();
        store.record_referral(1).await.unwrap();

        let (referrals, progress) = store.stats(1).await.unwrap();
        assert_eq!(referrals, 1);
        assert_eq!(progress, 1);
    }

    #[tokio::test]
    async fn stats_unknown_reader() {
        let store = setup_store().await;

        let result = store.stats(404).await;
        match result.unwrap_err() {
            StoreError::NotFound { entity, id } => {
                assert_eq!(entity, "reader");
                assert_eq!(id, 404);
            }
            other => panic!("expected NotFound, got: {other}"),
        }
    }

    #[tokio::test]
    async fn count_readers() {
        let store = setup_store().await;
        assert_eq!(store.count().await.unwrap(), 0);

        store.create_if_absent(1, None, None).await.unwrap();
        store.create_if_absent(2, None, Some(1)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn referral_chain_walkthrough() {
        // A starts unreferred, B and C start with A as referrer.
        let store = setup_store().await;

        store.create_if_absent(1, Some("a"), None).await.unwrap();
        let (r, p) = store.stats(1).await.unwrap();
        assert_eq!((r, p), (0, 1));

        store.create_if_absent(2, Some("b"), Some(1)).await.unwrap();
        let outcome = store.record_referral(1).await.unwrap();
        assert_eq!(outcome, ReferralOutcome::Counted { referrals: 1 });
        let (r, p) = store.stats(1).await.unwrap();
        assert_eq!((r, p), (1, 1));

        store.create_if_absent(3, Some("c"), Some(1)).await.unwrap();
        let outcome = store.record_referral(1).await.unwrap();
        assert_eq!(outcome, ReferralOutcome::Unlocked { referrals: 2 });
        let (r, p) = store.stats(1).await.unwrap();
        assert_eq!((r, p), (2, 2));
    }
}
