//! Round lifecycle: start/end and the single-active-round invariant.
//!
//! Ending a round is one transaction: settlement runs over a snapshot taken
//! before any entry is mutated, wallet credits are applied, the round's
//! bankroll entries are deleted and the round is marked closed. A failure
//! anywhere rolls the whole unit back.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::engine::rewards::{self, SettlementReport};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{BankrollSnapshotEntry, PoolAccount, Round, RoundId, RoundStatus};
use crate::store::balances;
use crate::store::db::{corrupt_column, parse_timestamp, LedgerDb};

/// Id of the round currently accepting bankroll activity, if any.
pub(crate) fn active_round_id(conn: &Connection) -> rusqlite::Result<Option<RoundId>> {
    conn.query_row(
        "SELECT id FROM rounds WHERE status = 'active'",
        [],
        |row| row.get(0),
    )
    .optional()
}

fn bankroll_snapshot(
    conn: &Connection,
    round: RoundId,
) -> rusqlite::Result<Vec<BankrollSnapshotEntry>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, balance, from_wallet FROM bankroll_entries WHERE round_id = ?1",
    )?;
    let entries = stmt
        .query_map(params![round], |row| {
            Ok(BankrollSnapshotEntry {
                user_id: row.get(0)?,
                balance: row.get(1)?,
                from_wallet: row.get::<_, i64>(2)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Round lifecycle manager.
#[derive(Clone)]
pub struct SessionManager {
    db: LedgerDb,
}

impl SessionManager {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Start a new round. Fails while another round is active; the partial
    /// unique index on `rounds(status)` makes the insert itself the arbiter
    /// if two starts race through separate connections.
    pub async fn start_session(&self) -> LedgerResult<Round> {
        let conn = self.db.conn.lock().await;

        if active_round_id(&conn)?.is_some() {
            return Err(LedgerError::invalid_state("a session is already active"));
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO rounds (status, created_at) VALUES ('active', ?1)",
            params![now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        info!("Session {} started", id);

        Ok(Round {
            id,
            status: RoundStatus::Active,
            created_at: now,
        })
    }

    /// The currently active round, if any.
    pub async fn active_round(&self) -> LedgerResult<Option<Round>> {
        let conn = self.db.conn.lock().await;
        let round = conn
            .query_row(
                "SELECT id, status, created_at FROM rounds WHERE status = 'active'",
                [],
                |row| {
                    let status_raw: String = row.get(1)?;
                    Ok(Round {
                        id: row.get(0)?,
                        status: RoundStatus::parse(&status_raw)
                            .ok_or_else(|| corrupt_column("round status", &status_raw))?,
                        created_at: parse_timestamp(&row.get::<_, String>(2)?)?,
                    })
                },
            )
            .optional()?;
        Ok(round)
    }

    /// End the active round: rank the bankroll snapshot, credit wallet
    /// bonuses, reclaim the bankroll entries and close the round.
    pub async fn end_session(&self) -> LedgerResult<SettlementReport> {
        let opening = self.db.opening_balance;
        let mut conn = self.db.conn.lock().await;
        let tx = conn.transaction()?;

        let round_id = active_round_id(&tx)?
            .ok_or_else(|| LedgerError::invalid_state("no session is currently active"))?;

        // Snapshot before any entry is mutated so ranking reflects
        // pre-settlement balances.
        let snapshot = bankroll_snapshot(&tx, round_id)?;
        let report = rewards::settle_round(round_id, snapshot);

        for line in &report.lines {
            if line.bonus > 0 {
                balances::credit_funds(&tx, line.user_id, PoolAccount::Wallet, line.bonus, opening)?;
            }
        }

        tx.execute(
            "DELETE FROM bankroll_entries WHERE round_id = ?1",
            params![round_id],
        )?;
        tx.execute(
            "UPDATE rounds SET status = 'closed' WHERE id = ?1",
            params![round_id],
        )?;
        tx.commit()?;

        info!(
            "Session {} closed: {} credits paid into {} wallets",
            round_id,
            report.total_bonus,
            report.lines.iter().filter(|l| l.bonus > 0).count()
        );
        Ok(report)
    }
}
