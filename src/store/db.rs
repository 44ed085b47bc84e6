//! Connection management and schema.
//!
//! One SQLite connection in WAL mode behind an async mutex; every component
//! clones the same [`LedgerDb`] handle, so all balance-mutating operations
//! are mutually exclusive. Multi-step mutations (wager acceptance, bet
//! resolution, round-end settlement) run inside `rusqlite` transactions on
//! that connection: they commit as one unit or not at all.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;

/// Schema. The partial unique index on `rounds(status)` is what makes round
/// creation a single atomic insert: a second active round cannot exist even
/// if another connection races us.
const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    handle TEXT UNIQUE NOT NULL,
    display_name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rounds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_rounds_one_active
    ON rounds(status) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS wallets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER UNIQUE NOT NULL,
    balance INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS bankroll_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    round_id INTEGER NOT NULL,
    balance INTEGER NOT NULL,
    from_wallet INTEGER NOT NULL DEFAULT 0,
    UNIQUE(user_id, round_id)
);

CREATE TABLE IF NOT EXISTS bets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    round_id INTEGER,
    question TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bets_round ON bets(round_id);

CREATE TABLE IF NOT EXISTS bet_options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bet_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    is_winner INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_bet_options_bet ON bet_options(bet_id);

CREATE TABLE IF NOT EXISTS wagers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    bet_id INTEGER NOT NULL,
    option_id INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    pool TEXT NOT NULL,
    result TEXT NOT NULL DEFAULT 'pending',
    payout INTEGER NOT NULL DEFAULT 0,
    placed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_wagers_bet ON wagers(bet_id);
CREATE INDEX IF NOT EXISTS idx_wagers_user_result ON wagers(user_id, result);
"#;

/// Shared handle to the ledger database.
#[derive(Clone)]
pub struct LedgerDb {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) opening_balance: i64,
}

impl LedgerDb {
    /// Open (or create) the database at `db_path` and apply the schema.
    pub fn open(db_path: &str, opening_balance: i64) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open database at {}", db_path))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to apply ledger schema")?;

        info!("Ledger database ready at {}", db_path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            opening_balance,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(&config.database_path, config.opening_balance)
    }

    /// In-memory database with the full schema applied. Used by tests.
    pub fn open_in_memory(opening_balance: i64) -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to apply ledger schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            opening_balance,
        })
    }

    pub fn opening_balance(&self) -> i64 {
        self.opening_balance
    }
}

/// Conversion error for a TEXT column holding an unexpected value.
pub(crate) fn corrupt_column(column: &'static str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("unexpected {} value: {}", column, value).into(),
    )
}

pub(crate) fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt_column("timestamp", raw))
}
