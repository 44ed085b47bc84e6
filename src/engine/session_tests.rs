//! Session lifecycle tests: the single-active-round invariant and
//! end-of-round reward distribution.

use crate::engine::session::SessionManager;
use crate::error::LedgerError;
use crate::models::{PoolAccount, RoundStatus, UserId};
use crate::store::balances::BalanceStore;
use crate::store::db::LedgerDb;

struct Harness {
    db: LedgerDb,
    balances: BalanceStore,
    sessions: SessionManager,
}

fn harness() -> Harness {
    let db = LedgerDb::open_in_memory(1000).unwrap();
    Harness {
        balances: BalanceStore::new(db.clone()),
        sessions: SessionManager::new(db.clone()),
        db,
    }
}

async fn bankroll_rows(h: &Harness, round_id: i64) -> i64 {
    let conn = h.db.conn.lock().await;
    conn.query_row(
        "SELECT COUNT(*) FROM bankroll_entries WHERE round_id = ?1",
        rusqlite::params![round_id],
        |row| row.get(0),
    )
    .unwrap()
}

/// Seed a wallet-transferred bankroll entry at an exact balance: a 100
/// transfer marks the entry, then a reservation trims it to `target`.
async fn seeded_entry(h: &Harness, user: UserId, round_id: i64, target: i64) {
    h.balances
        .transfer_wallet_to_bankroll(user, round_id, 100)
        .await
        .unwrap();
    h.balances
        .reserve(user, PoolAccount::Bankroll(round_id), 1100 - target)
        .await
        .unwrap();
}

#[tokio::test]
async fn at_most_one_session_is_active() {
    let h = harness();

    let round = h.sessions.start_session().await.unwrap();
    assert_eq!(round.status, RoundStatus::Active);

    assert!(matches!(
        h.sessions.start_session().await.unwrap_err(),
        LedgerError::InvalidState(_)
    ));

    h.sessions.end_session().await.unwrap();
    assert!(h.sessions.active_round().await.unwrap().is_none());

    // A new round can start once the old one is closed.
    let next = h.sessions.start_session().await.unwrap();
    assert_ne!(next.id, round.id);
}

#[tokio::test]
async fn ending_without_an_active_session_is_rejected() {
    let h = harness();

    assert!(matches!(
        h.sessions.end_session().await.unwrap_err(),
        LedgerError::InvalidState(_)
    ));
}

#[tokio::test]
async fn round_end_rewards_follow_the_multiplier_schedule() {
    let h = harness();
    let round = h.sessions.start_session().await.unwrap();

    seeded_entry(&h, 1, round.id, 500).await;
    seeded_entry(&h, 2, round.id, 300).await;
    seeded_entry(&h, 3, round.id, 100).await;

    let report = h.sessions.end_session().await.unwrap();

    assert_eq!(report.round_id, round.id);
    let summary: Vec<(usize, UserId, i64, i64)> = report
        .lines
        .iter()
        .map(|l| (l.rank, l.user_id, l.original_balance, l.bonus))
        .collect();
    assert_eq!(
        summary,
        vec![(1, 1, 500, 1250), (2, 2, 300, 660), (3, 3, 100, 200)]
    );
    assert_eq!(report.total_bonus, 2110);

    // Wallets: 1000 - 100 transferred + bonus.
    assert_eq!(h.balances.balance(1, PoolAccount::Wallet).await.unwrap(), 2150);
    assert_eq!(h.balances.balance(2, PoolAccount::Wallet).await.unwrap(), 1560);
    assert_eq!(h.balances.balance(3, PoolAccount::Wallet).await.unwrap(), 1100);

    // All bankroll entries for the round are reclaimed.
    assert_eq!(bankroll_rows(&h, round.id).await, 0);
}

#[tokio::test]
async fn unseeded_entries_pass_through_at_face_value() {
    let h = harness();
    let round = h.sessions.start_session().await.unwrap();

    // Touch the bankroll without a wallet transfer, then spend half.
    h.balances
        .reserve(4, PoolAccount::Bankroll(round.id), 500)
        .await
        .unwrap();

    let report = h.sessions.end_session().await.unwrap();
    assert_eq!(report.lines.len(), 1);
    assert_eq!(report.lines[0].multiplier, 1.0);
    assert_eq!(report.lines[0].bonus, 500);

    assert_eq!(h.balances.balance(4, PoolAccount::Wallet).await.unwrap(), 1500);
}

#[tokio::test]
async fn fully_spent_entries_get_no_bonus() {
    let h = harness();
    let round = h.sessions.start_session().await.unwrap();

    h.balances
        .reserve(5, PoolAccount::Bankroll(round.id), 1000)
        .await
        .unwrap();

    let report = h.sessions.end_session().await.unwrap();
    assert_eq!(report.lines.len(), 1);
    assert_eq!(report.lines[0].original_balance, 0);
    assert_eq!(report.lines[0].bonus, 0);
    assert_eq!(h.balances.balance(5, PoolAccount::Wallet).await.unwrap(), 1000);
}

#[tokio::test]
async fn next_round_reopens_bankrolls_at_the_opening_balance() {
    let h = harness();
    let first = h.sessions.start_session().await.unwrap();
    h.balances
        .reserve(1, PoolAccount::Bankroll(first.id), 900)
        .await
        .unwrap();
    h.sessions.end_session().await.unwrap();

    let second = h.sessions.start_session().await.unwrap();
    assert_eq!(
        h.balances
            .balance(1, PoolAccount::Bankroll(second.id))
            .await
            .unwrap(),
        1000
    );
}
