//! Settlement engine tests: payout correctness, terminal states and
//! at-most-once resolution.

use crate::engine::registry::BetRegistry;
use crate::engine::session::SessionManager;
use crate::engine::settlement::SettlementEngine;
use crate::error::LedgerError;
use crate::models::{Bet, BetKind, Pool, PoolAccount, Round, WagerResult};
use crate::store::balances::BalanceStore;
use crate::store::db::LedgerDb;

struct Harness {
    balances: BalanceStore,
    registry: BetRegistry,
    sessions: SessionManager,
    settlement: SettlementEngine,
}

fn harness() -> Harness {
    let db = LedgerDb::open_in_memory(1000).unwrap();
    Harness {
        balances: BalanceStore::new(db.clone()),
        registry: BetRegistry::new(db.clone()),
        sessions: SessionManager::new(db.clone()),
        settlement: SettlementEngine::new(db),
    }
}

/// Active round plus an open two-option bet with a 300-credit bankroll
/// wager from user 1 on the first option.
async fn staked_bet(h: &Harness) -> (Round, Bet) {
    let round = h.sessions.start_session().await.unwrap();
    let bet = h
        .registry
        .create_bet("Who takes game one?", &["Red", "Blue"], BetKind::Standard)
        .await
        .unwrap();
    h.registry
        .place_wager(bet.id, 1, bet.options[0].id, 300, Pool::Bankroll)
        .await
        .unwrap();
    (round, bet)
}

#[tokio::test]
async fn winning_wager_pays_double_into_its_pool() {
    let h = harness();
    let (round, bet) = staked_bet(&h).await;

    let settlement = h
        .settlement
        .resolve_bet(bet.id, bet.options[0].id)
        .await
        .unwrap();

    assert_eq!(settlement.outcomes.len(), 1);
    assert_eq!(settlement.outcomes[0].result, WagerResult::Win);
    assert_eq!(settlement.outcomes[0].payout, 600);
    assert_eq!(settlement.total_staked, 300);
    assert_eq!(settlement.total_paid, 600);

    // 1000 - 300 + 600
    assert_eq!(
        h.balances
            .balance(1, PoolAccount::Bankroll(round.id))
            .await
            .unwrap(),
        1300
    );
    assert!(h.registry.list_pending_wagers(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn losing_wagers_pay_nothing() {
    let h = harness();
    let (round, bet) = staked_bet(&h).await;
    h.registry
        .place_wager(bet.id, 2, bet.options[1].id, 200, Pool::Bankroll)
        .await
        .unwrap();

    let settlement = h
        .settlement
        .resolve_bet(bet.id, bet.options[0].id)
        .await
        .unwrap();

    let loser = settlement
        .outcomes
        .iter()
        .find(|o| o.user_id == 2)
        .unwrap();
    assert_eq!(loser.result, WagerResult::Lose);
    assert_eq!(loser.payout, 0);
    // Stake stays spent: 1000 - 200.
    assert_eq!(
        h.balances
            .balance(2, PoolAccount::Bankroll(round.id))
            .await
            .unwrap(),
        800
    );
}

#[tokio::test]
async fn duplicate_resolution_fails_without_side_effects() {
    let h = harness();
    let (round, bet) = staked_bet(&h).await;

    h.settlement
        .resolve_bet(bet.id, bet.options[0].id)
        .await
        .unwrap();
    let before = h
        .balances
        .balance(1, PoolAccount::Bankroll(round.id))
        .await
        .unwrap();

    // Second resolution, even for the other option, must change nothing.
    let err = h
        .settlement
        .resolve_bet(bet.id, bet.options[1].id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyResolved(_)));

    assert_eq!(
        h.balances
            .balance(1, PoolAccount::Bankroll(round.id))
            .await
            .unwrap(),
        before
    );
}

#[tokio::test]
async fn resolution_requires_an_option_of_the_bet() {
    let h = harness();
    let (_, bet) = staked_bet(&h).await;
    let other = h
        .registry
        .create_bet("Unrelated?", &["Yes", "No"], BetKind::Standard)
        .await
        .unwrap();

    let err = h
        .settlement
        .resolve_bet(bet.id, other.options[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn locked_bets_resolve_normally() {
    let h = harness();
    let (round, bet) = staked_bet(&h).await;

    h.registry.lock_bet(bet.id).await.unwrap();
    h.settlement
        .resolve_bet(bet.id, bet.options[0].id)
        .await
        .unwrap();

    assert_eq!(
        h.balances
            .balance(1, PoolAccount::Bankroll(round.id))
            .await
            .unwrap(),
        1300
    );
}

#[tokio::test]
async fn wallet_only_bets_resolve_without_a_session() {
    let h = harness();
    let bet = h
        .registry
        .create_bet("Side bet?", &["Yes", "No"], BetKind::WalletOnly)
        .await
        .unwrap();
    h.registry
        .place_wager(bet.id, 1, bet.options[0].id, 100, Pool::Wallet)
        .await
        .unwrap();

    h.settlement
        .resolve_bet(bet.id, bet.options[0].id)
        .await
        .unwrap();

    // 1000 - 100 + 200
    assert_eq!(h.balances.balance(1, PoolAccount::Wallet).await.unwrap(), 1100);
}

#[tokio::test]
async fn standard_bets_cannot_resolve_after_their_round_closes() {
    let h = harness();
    let (_, bet) = staked_bet(&h).await;
    h.sessions.end_session().await.unwrap();

    let err = h
        .settlement
        .resolve_bet(bet.id, bet.options[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
}

#[tokio::test]
async fn resolved_bets_accept_no_further_wagers() {
    let h = harness();
    let (_, bet) = staked_bet(&h).await;

    h.settlement
        .resolve_bet(bet.id, bet.options[0].id)
        .await
        .unwrap();

    let err = h
        .registry
        .place_wager(bet.id, 2, bet.options[1].id, 50, Pool::Bankroll)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
}
