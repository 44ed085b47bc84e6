//! Proposition lifecycle and wager acceptance.
//!
//! Bets move OPEN -> LOCKED -> RESOLVED, or OPEN/LOCKED -> CANCELLED.
//! Wager acceptance reserves the stake and records the pending wager inside
//! one transaction, so a failed reservation never leaves a wager behind.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::engine::session::active_round_id;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Bet, BetId, BetKind, BetOption, BetStatus, BetWagerSummary, OptionId, OptionTotal, Pool,
    PoolAccount, RoundId, UserId, Wager, WagerResult,
};
use crate::store::balances;
use crate::store::db::{corrupt_column, parse_timestamp, LedgerDb};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 8;

/// Bet header fields the validation paths care about.
pub(crate) struct BetRow {
    pub round_id: Option<RoundId>,
    pub kind: BetKind,
    pub status: BetStatus,
}

pub(crate) fn fetch_bet(conn: &Connection, bet_id: BetId) -> LedgerResult<BetRow> {
    conn.query_row(
        "SELECT round_id, kind, status FROM bets WHERE id = ?1",
        params![bet_id],
        |row| {
            let kind_raw: String = row.get(1)?;
            let status_raw: String = row.get(2)?;
            Ok(BetRow {
                round_id: row.get(0)?,
                kind: BetKind::parse(&kind_raw)
                    .ok_or_else(|| corrupt_column("bet kind", &kind_raw))?,
                status: BetStatus::parse(&status_raw)
                    .ok_or_else(|| corrupt_column("bet status", &status_raw))?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LedgerError::not_found("bet", bet_id))
}

pub(crate) fn option_belongs_to(
    conn: &Connection,
    bet_id: BetId,
    option_id: OptionId,
) -> LedgerResult<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM bet_options WHERE id = ?1 AND bet_id = ?2",
            params![option_id, bet_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(LedgerError::not_found("option", option_id));
    }
    Ok(())
}

fn map_wager(row: &rusqlite::Row<'_>) -> rusqlite::Result<Wager> {
    let pool_raw: String = row.get(5)?;
    let result_raw: String = row.get(6)?;
    Ok(Wager {
        id: row.get(0)?,
        user_id: row.get(1)?,
        bet_id: row.get(2)?,
        option_id: row.get(3)?,
        amount: row.get(4)?,
        pool: Pool::parse(&pool_raw).ok_or_else(|| corrupt_column("wager pool", &pool_raw))?,
        result: WagerResult::parse(&result_raw)
            .ok_or_else(|| corrupt_column("wager result", &result_raw))?,
        payout: row.get(7)?,
        placed_at: parse_timestamp(&row.get::<_, String>(8)?)?,
    })
}

/// Bet/option lifecycle and wager acceptance.
#[derive(Clone)]
pub struct BetRegistry {
    db: LedgerDb,
}

impl BetRegistry {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Create a bet with 2-8 options. Standard bets require an active round
    /// and are owned by it; wallet-only bets may exist without one.
    pub async fn create_bet(
        &self,
        question: &str,
        options: &[&str],
        kind: BetKind,
    ) -> LedgerResult<Bet> {
        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return Err(LedgerError::invalid_input(format!(
                "bets take {} to {} options, got {}",
                MIN_OPTIONS,
                MAX_OPTIONS,
                options.len()
            )));
        }

        let mut conn = self.db.conn.lock().await;
        let tx = conn.transaction()?;

        let round_id = match kind {
            BetKind::Standard => Some(active_round_id(&tx)?.ok_or_else(|| {
                LedgerError::invalid_state("no active session; start one before creating bets")
            })?),
            BetKind::WalletOnly => None,
        };

        let now = Utc::now();
        tx.execute(
            "INSERT INTO bets (round_id, question, kind, status, created_at)
             VALUES (?1, ?2, ?3, 'open', ?4)",
            params![round_id, question, kind.as_str(), now.to_rfc3339()],
        )?;
        let bet_id = tx.last_insert_rowid();

        let mut created = Vec::with_capacity(options.len());
        for label in options {
            tx.execute(
                "INSERT INTO bet_options (bet_id, label, is_winner) VALUES (?1, ?2, 0)",
                params![bet_id, label],
            )?;
            created.push(BetOption {
                id: tx.last_insert_rowid(),
                bet_id,
                label: label.to_string(),
                is_winner: false,
            });
        }
        tx.commit()?;

        info!(
            "Bet {} created ({}, {} options): {}",
            bet_id,
            kind.as_str(),
            created.len(),
            question
        );
        Ok(Bet {
            id: bet_id,
            round_id,
            question: question.to_string(),
            kind,
            status: BetStatus::Open,
            created_at: now,
            options: created,
        })
    }

    /// Accept a stake on one option of an open bet. Reserves the amount from
    /// the chosen pool and records the pending wager as one unit; on
    /// `InsufficientFunds` no wager is created.
    ///
    /// Wallet-only bets silently force `pool = Wallet`, whatever the caller
    /// asked for; the accepted wager records the effective pool. Bankroll
    /// wagers require the bet's round to be the currently active one.
    pub async fn place_wager(
        &self,
        bet_id: BetId,
        user: UserId,
        option_id: OptionId,
        amount: i64,
        pool: Pool,
    ) -> LedgerResult<Wager> {
        if amount <= 0 {
            return Err(LedgerError::invalid_input(format!(
                "wager amount must be positive, got {}",
                amount
            )));
        }

        let opening = self.db.opening_balance;
        let mut conn = self.db.conn.lock().await;
        let tx = conn.transaction()?;

        let bet = fetch_bet(&tx, bet_id)?;
        if bet.status != BetStatus::Open {
            return Err(LedgerError::invalid_state(format!(
                "bet {} is {}; wagers are only accepted while it is open",
                bet_id,
                bet.status.as_str()
            )));
        }
        option_belongs_to(&tx, bet_id, option_id)?;

        let effective = match bet.kind {
            BetKind::WalletOnly => Pool::Wallet,
            BetKind::Standard => pool,
        };
        let account = match effective {
            Pool::Wallet => PoolAccount::Wallet,
            Pool::Bankroll => match (bet.round_id, active_round_id(&tx)?) {
                (Some(round), Some(active)) if round == active => PoolAccount::Bankroll(round),
                _ => {
                    return Err(LedgerError::invalid_state(
                        "bankroll wagers require the bet's round to be the active one",
                    ))
                }
            },
        };

        balances::reserve_funds(&tx, user, account, amount, opening)?;

        let now = Utc::now();
        tx.execute(
            "INSERT INTO wagers (user_id, bet_id, option_id, amount, pool, result, payout, placed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)",
            params![
                user,
                bet_id,
                option_id,
                amount,
                effective.as_str(),
                now.to_rfc3339()
            ],
        )?;
        let wager_id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(
            "User {} wagered {} from {} on option {} of bet {}",
            user,
            amount,
            effective.as_str(),
            option_id,
            bet_id
        );
        Ok(Wager {
            id: wager_id,
            user_id: user,
            bet_id,
            option_id,
            amount,
            pool: effective,
            result: WagerResult::Pending,
            payout: 0,
            placed_at: now,
        })
    }

    /// OPEN -> LOCKED: no more wagers. Fails on any other state.
    pub async fn lock_bet(&self, bet_id: BetId) -> LedgerResult<()> {
        let conn = self.db.conn.lock().await;

        let bet = fetch_bet(&conn, bet_id)?;
        if bet.status != BetStatus::Open {
            return Err(LedgerError::invalid_state(format!(
                "bet {} is {} and cannot be locked",
                bet_id,
                bet.status.as_str()
            )));
        }
        conn.execute(
            "UPDATE bets SET status = 'locked' WHERE id = ?1",
            params![bet_id],
        )?;
        info!("Bet {} locked", bet_id);
        Ok(())
    }

    /// Cancel an open or locked bet, removing it and its options.
    ///
    /// Outstanding wagers are deliberately left in place, unrefunded: the
    /// stake stays reserved and the orphaned rows remain pending. See
    /// DESIGN.md for the rationale behind keeping this behavior.
    pub async fn cancel_bet(&self, bet_id: BetId) -> LedgerResult<()> {
        let mut conn = self.db.conn.lock().await;
        let tx = conn.transaction()?;

        let bet = fetch_bet(&tx, bet_id)?;
        match bet.status {
            BetStatus::Open | BetStatus::Locked => {}
            _ => {
                return Err(LedgerError::invalid_state(format!(
                    "bet {} is {} and cannot be cancelled",
                    bet_id,
                    bet.status.as_str()
                )))
            }
        }

        let orphaned: i64 = tx.query_row(
            "SELECT COUNT(*) FROM wagers WHERE bet_id = ?1 AND result = 'pending'",
            params![bet_id],
            |row| row.get(0),
        )?;
        tx.execute("DELETE FROM bet_options WHERE bet_id = ?1", params![bet_id])?;
        tx.execute("DELETE FROM bets WHERE id = ?1", params![bet_id])?;
        tx.commit()?;

        info!(
            "Bet {} cancelled; {} pending wagers left unrefunded",
            bet_id, orphaned
        );
        Ok(())
    }

    /// The user's pending wagers, oldest first.
    pub async fn list_pending_wagers(&self, user: UserId) -> LedgerResult<Vec<Wager>> {
        let conn = self.db.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, bet_id, option_id, amount, pool, result, payout, placed_at
             FROM wagers WHERE user_id = ?1 AND result = 'pending' ORDER BY id",
        )?;
        let wagers = stmt
            .query_map(params![user], |row| map_wager(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(wagers)
    }

    /// Aggregate stake view of a bet: total pot, participant count and
    /// per-option totals.
    pub async fn wager_summary(&self, bet_id: BetId) -> LedgerResult<BetWagerSummary> {
        let conn = self.db.conn.lock().await;
        fetch_bet(&conn, bet_id)?;

        let (total_pot, participants) = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0), COUNT(DISTINCT user_id)
             FROM wagers WHERE bet_id = ?1",
            params![bet_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT o.id, o.label, COALESCE(SUM(w.amount), 0)
             FROM bet_options o
             LEFT JOIN wagers w ON w.option_id = o.id
             WHERE o.bet_id = ?1
             GROUP BY o.id, o.label
             ORDER BY o.id",
        )?;
        let option_totals = stmt
            .query_map(params![bet_id], |row| {
                Ok(OptionTotal {
                    option_id: row.get(0)?,
                    label: row.get(1)?,
                    total: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BetWagerSummary {
            bet_id,
            total_pot,
            participants,
            option_totals,
        })
    }
}
