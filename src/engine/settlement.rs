//! Per-bet resolution and payout.
//!
//! The canonical payout policy is a fixed 2x of the stake, credited back to
//! the wager's original pool. Pot-proportional sharing and odds-weighted
//! payouts are documented alternatives, not behaviors: changing policy means
//! changing [`payout_for`], nothing else.
//!
//! The full settlement (every wager result, every credit, the winner flag
//! and the status flip) commits as one transaction. A duplicate resolution
//! attempt fails with no side effects, however many expired or repeated
//! front-end selections reach the engine.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::registry::{fetch_bet, option_belongs_to};
use crate::engine::session::active_round_id;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    BetId, BetStatus, OptionId, Pool, PoolAccount, UserId, WagerId, WagerResult,
};
use crate::store::balances;
use crate::store::db::{corrupt_column, LedgerDb};

/// Winning wagers pay stake times this.
pub const WIN_MULTIPLIER: i64 = 2;

fn payout_for(stake: i64) -> i64 {
    stake * WIN_MULTIPLIER
}

struct PendingWager {
    id: WagerId,
    user_id: UserId,
    option_id: OptionId,
    amount: i64,
    pool: Pool,
}

fn pending_wagers(conn: &Connection, bet_id: BetId) -> rusqlite::Result<Vec<PendingWager>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, option_id, amount, pool
         FROM wagers WHERE bet_id = ?1 AND result = 'pending' ORDER BY id",
    )?;
    let wagers = stmt
        .query_map(params![bet_id], |row| {
            let pool_raw: String = row.get(4)?;
            Ok(PendingWager {
                id: row.get(0)?,
                user_id: row.get(1)?,
                option_id: row.get(2)?,
                amount: row.get(3)?,
                pool: Pool::parse(&pool_raw)
                    .ok_or_else(|| corrupt_column("wager pool", &pool_raw))?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(wagers)
}

/// Outcome of one wager in a resolved bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerOutcome {
    pub wager_id: WagerId,
    pub user_id: UserId,
    pub option_id: OptionId,
    pub result: WagerResult,
    pub payout: i64,
}

/// Settlement report for one resolved bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetSettlement {
    pub bet_id: BetId,
    pub winning_option_id: OptionId,
    pub total_staked: i64,
    pub total_paid: i64,
    pub outcomes: Vec<WagerOutcome>,
}

/// Per-bet resolution.
#[derive(Clone)]
pub struct SettlementEngine {
    db: LedgerDb,
}

impl SettlementEngine {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Resolve a bet in favor of `winning_option_id`, paying every winning
    /// wager a fixed 2x into its original pool and marking the rest lost.
    pub async fn resolve_bet(
        &self,
        bet_id: BetId,
        winning_option_id: OptionId,
    ) -> LedgerResult<BetSettlement> {
        let opening = self.db.opening_balance;
        let mut conn = self.db.conn.lock().await;
        let tx = conn.transaction()?;

        let bet = fetch_bet(&tx, bet_id)?;
        match bet.status {
            BetStatus::Open | BetStatus::Locked => {}
            BetStatus::Resolved => return Err(LedgerError::AlreadyResolved(bet_id)),
            BetStatus::Cancelled => {
                return Err(LedgerError::invalid_state(format!(
                    "bet {} is cancelled and cannot be resolved",
                    bet_id
                )))
            }
        }
        option_belongs_to(&tx, bet_id, winning_option_id)?;

        // Standard bets pay bankroll wagers back into their owning round;
        // once that round is closed its bankroll entries are gone, so
        // resolution is only valid while the round is still the active one.
        if let Some(round_id) = bet.round_id {
            if active_round_id(&tx)? != Some(round_id) {
                return Err(LedgerError::invalid_state(format!(
                    "round {} owning bet {} is no longer active",
                    round_id, bet_id
                )));
            }
        }

        let pending = pending_wagers(&tx, bet_id)?;
        let mut outcomes = Vec::with_capacity(pending.len());
        let mut total_staked = 0;
        let mut total_paid = 0;

        for wager in &pending {
            total_staked += wager.amount;
            if wager.option_id == winning_option_id {
                let payout = payout_for(wager.amount);
                let account = match (wager.pool, bet.round_id) {
                    (Pool::Wallet, _) => PoolAccount::Wallet,
                    (Pool::Bankroll, Some(round)) => PoolAccount::Bankroll(round),
                    (Pool::Bankroll, None) => {
                        return Err(LedgerError::invalid_state(format!(
                            "wager {} draws from a bankroll but bet {} has no round",
                            wager.id, bet_id
                        )))
                    }
                };
                balances::credit_funds(&tx, wager.user_id, account, payout, opening)?;
                tx.execute(
                    "UPDATE wagers SET result = 'win', payout = ?2 WHERE id = ?1",
                    params![wager.id, payout],
                )?;
                total_paid += payout;
                outcomes.push(WagerOutcome {
                    wager_id: wager.id,
                    user_id: wager.user_id,
                    option_id: wager.option_id,
                    result: WagerResult::Win,
                    payout,
                });
            } else {
                tx.execute(
                    "UPDATE wagers SET result = 'lose', payout = 0 WHERE id = ?1",
                    params![wager.id],
                )?;
                outcomes.push(WagerOutcome {
                    wager_id: wager.id,
                    user_id: wager.user_id,
                    option_id: wager.option_id,
                    result: WagerResult::Lose,
                    payout: 0,
                });
            }
        }

        tx.execute(
            "UPDATE bet_options SET is_winner = 1 WHERE id = ?1",
            params![winning_option_id],
        )?;
        tx.execute(
            "UPDATE bets SET status = 'resolved' WHERE id = ?1",
            params![bet_id],
        )?;
        tx.commit()?;

        info!(
            "Bet {} resolved: option {} wins, {} paid out across {} wagers",
            bet_id,
            winning_option_id,
            total_paid,
            outcomes.len()
        );
        Ok(BetSettlement {
            bet_id,
            winning_option_id,
            total_staked,
            total_paid,
            outcomes,
        })
    }
}
