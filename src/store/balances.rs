//! Atomic balance mutations on the two credit pools.
//!
//! The reservation primitive is a single conditional UPDATE: the
//! sufficient-funds check and the decrement happen in one statement, so two
//! concurrent reservations can never both pass against the same stale
//! balance. Rows are created lazily at the opening balance on first access;
//! that is normal behavior, not an error.
//!
//! The connection-level helpers take `&Connection` so the settlement paths
//! can compose them inside their own transactions.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{PoolAccount, RoundId, UserId};
use crate::store::db::LedgerDb;

pub(crate) fn ensure_account(
    conn: &Connection,
    user: UserId,
    account: PoolAccount,
    opening: i64,
) -> rusqlite::Result<()> {
    match account {
        PoolAccount::Wallet => {
            conn.execute(
                "INSERT OR IGNORE INTO wallets (user_id, balance) VALUES (?1, ?2)",
                params![user, opening],
            )?;
        }
        PoolAccount::Bankroll(round) => {
            conn.execute(
                "INSERT OR IGNORE INTO bankroll_entries (user_id, round_id, balance, from_wallet)
                 VALUES (?1, ?2, ?3, 0)",
                params![user, round, opening],
            )?;
        }
    }
    Ok(())
}

fn select_balance(conn: &Connection, user: UserId, account: PoolAccount) -> rusqlite::Result<i64> {
    match account {
        PoolAccount::Wallet => conn.query_row(
            "SELECT balance FROM wallets WHERE user_id = ?1",
            params![user],
            |row| row.get(0),
        ),
        PoolAccount::Bankroll(round) => conn.query_row(
            "SELECT balance FROM bankroll_entries WHERE user_id = ?1 AND round_id = ?2",
            params![user, round],
            |row| row.get(0),
        ),
    }
}

pub(crate) fn account_balance(
    conn: &Connection,
    user: UserId,
    account: PoolAccount,
    opening: i64,
) -> LedgerResult<i64> {
    ensure_account(conn, user, account, opening)?;
    Ok(select_balance(conn, user, account)?)
}

/// Decrement-if-sufficient in one indivisible statement. Fails with
/// `InsufficientFunds` when the precondition does not hold at the moment of
/// the atomic check, leaving the balance untouched.
pub(crate) fn reserve_funds(
    conn: &Connection,
    user: UserId,
    account: PoolAccount,
    amount: i64,
    opening: i64,
) -> LedgerResult<i64> {
    if amount <= 0 {
        return Err(LedgerError::invalid_input(format!(
            "reserve amount must be positive, got {}",
            amount
        )));
    }
    ensure_account(conn, user, account, opening)?;

    let changed = match account {
        PoolAccount::Wallet => conn.execute(
            "UPDATE wallets SET balance = balance - ?2
             WHERE user_id = ?1 AND balance >= ?2",
            params![user, amount],
        )?,
        PoolAccount::Bankroll(round) => conn.execute(
            "UPDATE bankroll_entries SET balance = balance - ?3
             WHERE user_id = ?1 AND round_id = ?2 AND balance >= ?3",
            params![user, round, amount],
        )?,
    };

    if changed == 0 {
        let available = select_balance(conn, user, account)?;
        return Err(LedgerError::InsufficientFunds {
            needed: amount,
            available,
        });
    }

    let balance = select_balance(conn, user, account)?;
    debug!(
        "Reserved {} from {} pool of user {} -> {}",
        amount,
        account.pool().as_str(),
        user,
        balance
    );
    Ok(balance)
}

/// Increment, creating the row at the opening balance first if absent.
pub(crate) fn credit_funds(
    conn: &Connection,
    user: UserId,
    account: PoolAccount,
    amount: i64,
    opening: i64,
) -> LedgerResult<i64> {
    if amount <= 0 {
        return Err(LedgerError::invalid_input(format!(
            "credit amount must be positive, got {}",
            amount
        )));
    }
    ensure_account(conn, user, account, opening)?;

    match account {
        PoolAccount::Wallet => conn.execute(
            "UPDATE wallets SET balance = balance + ?2 WHERE user_id = ?1",
            params![user, amount],
        )?,
        PoolAccount::Bankroll(round) => conn.execute(
            "UPDATE bankroll_entries SET balance = balance + ?3
             WHERE user_id = ?1 AND round_id = ?2",
            params![user, round, amount],
        )?,
    };

    let balance = select_balance(conn, user, account)?;
    debug!(
        "Credited {} to {} pool of user {} -> {}",
        amount,
        account.pool().as_str(),
        user,
        balance
    );
    Ok(balance)
}

fn mark_from_wallet(conn: &Connection, user: UserId, round: RoundId) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE bankroll_entries SET from_wallet = 1 WHERE user_id = ?1 AND round_id = ?2",
        params![user, round],
    )?;
    Ok(())
}

/// Result of a wallet-to-bankroll transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransfer {
    pub wallet_balance: i64,
    pub bankroll_balance: i64,
}

/// Atomic read/modify operations on the two credit pools.
#[derive(Clone)]
pub struct BalanceStore {
    db: LedgerDb,
}

impl BalanceStore {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Current balance, creating the backing row at the opening balance if
    /// absent.
    pub async fn balance(&self, user: UserId, account: PoolAccount) -> LedgerResult<i64> {
        let conn = self.db.conn.lock().await;
        account_balance(&conn, user, account, self.db.opening_balance)
    }

    /// Atomically check-and-decrement; `InsufficientFunds` leaves the
    /// balance untouched. Returns the new balance.
    pub async fn reserve(
        &self,
        user: UserId,
        account: PoolAccount,
        amount: i64,
    ) -> LedgerResult<i64> {
        let conn = self.db.conn.lock().await;
        reserve_funds(&conn, user, account, amount, self.db.opening_balance)
    }

    /// Atomically increment. Returns the new balance.
    pub async fn credit(
        &self,
        user: UserId,
        account: PoolAccount,
        amount: i64,
    ) -> LedgerResult<i64> {
        let conn = self.db.conn.lock().await;
        credit_funds(&conn, user, account, amount, self.db.opening_balance)
    }

    /// Move credits from the wallet into the round's bankroll entry and mark
    /// the entry as wallet-seeded. Both sides apply or neither does.
    pub async fn transfer_wallet_to_bankroll(
        &self,
        user: UserId,
        round: RoundId,
        amount: i64,
    ) -> LedgerResult<WalletTransfer> {
        let opening = self.db.opening_balance;
        let mut conn = self.db.conn.lock().await;
        let tx = conn.transaction()?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM rounds WHERE id = ?1",
                params![round],
                |row| row.get(0),
            )
            .optional()?;
        match status.as_deref() {
            None => return Err(LedgerError::not_found("round", round)),
            Some("active") => {}
            Some(_) => {
                return Err(LedgerError::invalid_state(format!(
                    "round {} is closed; transfers require the active round",
                    round
                )))
            }
        }

        let wallet_balance = reserve_funds(&tx, user, PoolAccount::Wallet, amount, opening)?;
        let bankroll_balance =
            credit_funds(&tx, user, PoolAccount::Bankroll(round), amount, opening)?;
        mark_from_wallet(&tx, user, round)?;
        tx.commit()?;

        debug!(
            "Transferred {} from wallet to bankroll for user {} in round {}",
            amount, user, round
        );
        Ok(WalletTransfer {
            wallet_balance,
            bankroll_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PoolAccount::{Bankroll, Wallet};

    fn store() -> BalanceStore {
        BalanceStore::new(LedgerDb::open_in_memory(1000).unwrap())
    }

    async fn open_round(store: &BalanceStore) -> RoundId {
        let conn = store.db.conn.lock().await;
        conn.execute(
            "INSERT INTO rounds (status, created_at) VALUES ('active', ?1)",
            params![chrono::Utc::now().to_rfc3339()],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[tokio::test]
    async fn unseen_accounts_open_at_the_opening_balance() {
        let store = store();
        let round = open_round(&store).await;

        assert_eq!(store.balance(7, Wallet).await.unwrap(), 1000);
        assert_eq!(store.balance(7, Bankroll(round)).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn reserve_decrements_and_rejects_overdraft() {
        let store = store();

        assert_eq!(store.reserve(1, Wallet, 300).await.unwrap(), 700);

        let err = store.reserve(1, Wallet, 800).await.unwrap_err();
        match err {
            LedgerError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, 800);
                assert_eq!(available, 700);
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
        // Failed reservation leaves the balance untouched.
        assert_eq!(store.balance(1, Wallet).await.unwrap(), 700);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let store = store();

        assert!(matches!(
            store.reserve(1, Wallet, 0).await.unwrap_err(),
            LedgerError::InvalidInput(_)
        ));
        assert!(matches!(
            store.credit(1, Wallet, -5).await.unwrap_err(),
            LedgerError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn credit_creates_row_then_adds() {
        let store = store();

        assert_eq!(store.credit(3, Wallet, 500).await.unwrap(), 1500);
    }

    #[tokio::test]
    async fn transfer_moves_credits_and_marks_entry() {
        let store = store();
        let round = open_round(&store).await;

        let moved = store.transfer_wallet_to_bankroll(2, round, 300).await.unwrap();
        assert_eq!(moved.wallet_balance, 700);
        assert_eq!(moved.bankroll_balance, 1300);

        let conn = store.db.conn.lock().await;
        let from_wallet: i64 = conn
            .query_row(
                "SELECT from_wallet FROM bankroll_entries WHERE user_id = 2 AND round_id = ?1",
                params![round],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(from_wallet, 1);
    }

    #[tokio::test]
    async fn failed_transfer_applies_neither_side() {
        let store = store();
        let round = open_round(&store).await;

        let err = store
            .transfer_wallet_to_bankroll(2, round, 5000)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        assert_eq!(store.balance(2, Wallet).await.unwrap(), 1000);
        // The bankroll row created inside the aborted transaction must be gone.
        let conn = store.db.conn.lock().await;
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bankroll_entries WHERE user_id = 2",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn transfer_requires_an_active_round() {
        let store = store();
        let round = open_round(&store).await;
        {
            let conn = store.db.conn.lock().await;
            conn.execute("UPDATE rounds SET status = 'closed' WHERE id = ?1", params![round])
                .unwrap();
        }

        assert!(matches!(
            store.transfer_wallet_to_bankroll(1, round, 100).await.unwrap_err(),
            LedgerError::InvalidState(_)
        ));
        assert!(matches!(
            store.transfer_wallet_to_bankroll(1, round + 99, 100).await.unwrap_err(),
            LedgerError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_reservations_cannot_both_overdraw() {
        let store = store();
        // Seed the wallet row.
        assert_eq!(store.balance(9, Wallet).await.unwrap(), 1000);

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.reserve(9, Wallet, 800).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.reserve(9, Wallet, 800).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let failures = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(failures, 1);
        assert_eq!(store.balance(9, Wallet).await.unwrap(), 200);
    }
}
