//! Integration tests for the storygate-store crate.
//!
//! These exercise the full database lifecycle — migrations, the referral
//! flow, and restart durability — against a real SQLite file on disk
//! (via tempfile).

use storygate_store::{
    BotStateStore, Database, KEY_POLL_OFFSET, ReaderStore, ReferralOutcome,
};

// ═══════════════════════════════════════════════════════════════════════
//  Database lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn open_and_migrate_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let db = Database::open_and_migrate(db_path.clone()).await.unwrap();

    let reader_count: i64 = db
        .execute(|conn| {
            let c: i64 = conn.query_row("SELECT count(*) FROM readers", [], |row| row.get(0))?;
            Ok(c)
        })
        .await
        .unwrap();
    assert_eq!(reader_count, 0);

    assert!(db_path.exists());
}

#[tokio::test]
async fn open_and_migrate_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_idempotent.db");

    let db = Database::open_and_migrate(db_path.clone()).await.unwrap();
    drop(db);
    Database::open_and_migrate(db_path).await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════
//  State survives a restart
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn readers_and_offset_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("restart.db");

    {
        let db = Database::open_and_migrate(db_path.clone()).await.unwrap();
        let readers = ReaderStore::new(db.clone());
        let state = BotStateStore::new(db);

        readers.create_if_absent(1, Some("a"), None).await.unwrap();
        readers.create_if_absent(2, Some("b"), Some(1)).await.unwrap();
        readers.record_referral(1).await.unwrap();
        state.set_i64(KEY_POLL_OFFSET, 500).await.unwrap();
    }

    // Simulated restart: reopen the same file.
    let db = Database::open_and_migrate(db_path).await.unwrap();
    let readers = ReaderStore::new(db.clone());
    let state = BotStateStore::new(db);

    assert_eq!(readers.count().await.unwrap(), 2);
    assert_eq!(readers.stats(1).await.unwrap(), (1, 1));
    assert_eq!(state.get_i64(KEY_POLL_OFFSET).await.unwrap(), Some(500));
}

// ═══════════════════════════════════════════════════════════════════════
//  Referral flow end to end
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_referral_flow_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("flow.db"))
        .await
        .unwrap();
    let readers = ReaderStore::new(db);

    readers.create_if_absent(1, Some("a"), None).await.unwrap();

    readers.create_if_absent(2, Some("b"), Some(1)).await.unwrap();
    assert_eq!(
        readers.record_referral(1).await.unwrap(),
        ReferralOutcome::Counted { referrals: 1 }
    );

    readers.create_if_absent(3, Some("c"), Some(1)).await.unwrap();
    assert_eq!(
        readers.record_referral(1).await.unwrap(),
        ReferralOutcome::Unlocked { referrals: 2 }
    );

    // The unlock is a one-shot: more referrals only count.
    readers.create_if_absent(4, Some("d"), Some(1)).await.unwrap();
    assert_eq!(
        readers.record_referral(1).await.unwrap(),
        ReferralOutcome::Counted { referrals: 3 }
    );

    assert_eq!(readers.stats(1).await.unwrap(), (3, 2));
}

#[tokio::test]
async fn concurrent_referrals_unlock_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("race.db"))
        .await
        .unwrap();
    let readers = ReaderStore::new(db);

    readers.create_if_absent(1, Some("a"), None).await.unwrap();

    // Fire several referrals for the same referrer at once; the
    // transactional compare-and-set must yield exactly one Unlocked.
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let r = readers.clone();
        tasks.push(tokio::spawn(async move { r.record_referral(1).await }));
    }

    let mut unlocked = 0;
    for task in tasks {
        if let ReferralOutcome::Unlocked { .. } = task.await.unwrap().unwrap() {
            unlocked += 1;
        }
    }
    assert_eq!(unlocked, 1);
    assert_eq!(readers.stats(1).await.unwrap(), (8, 2));
}
