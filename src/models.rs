//! Core data model shared across the store and engine modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default starting balance granted to a previously unseen wallet or
/// bankroll entry.
pub const DEFAULT_OPENING_BALANCE: i64 = 1000;

pub type UserId = i64;
pub type RoundId = i64;
pub type BetId = i64;
pub type OptionId = i64;
pub type WagerId = i64;

/// Which credit pool a wager draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    /// Persistent per-user pool surviving across rounds.
    Wallet,
    /// Per-user, per-round pool reclaimed at round end.
    Bankroll,
}

impl Pool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Wallet => "wallet",
            Pool::Bankroll => "bankroll",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wallet" => Some(Pool::Wallet),
            "bankroll" => Some(Pool::Bankroll),
            _ => None,
        }
    }
}

/// A concrete balance account: the persistent wallet, or one round's
/// bankroll entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAccount {
    Wallet,
    Bankroll(RoundId),
}

impl PoolAccount {
    pub fn pool(&self) -> Pool {
        match self {
            PoolAccount::Wallet => Pool::Wallet,
            PoolAccount::Bankroll(_) => Pool::Bankroll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Active,
    Closed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Active => "active",
            RoundStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RoundStatus::Active),
            "closed" => Some(RoundStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetKind {
    /// Owned by a round; wagers may draw from the round's bankroll.
    Standard,
    /// May exist without a round; wagers always draw from the wallet.
    WalletOnly,
}

impl BetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetKind::Standard => "standard",
            BetKind::WalletOnly => "wallet_only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(BetKind::Standard),
            "wallet_only" => Some(BetKind::WalletOnly),
            _ => None,
        }
    }
}

/// Bet lifecycle: OPEN -> LOCKED -> RESOLVED, or OPEN/LOCKED -> CANCELLED.
/// RESOLVED and CANCELLED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Open,
    Locked,
    Resolved,
    Cancelled,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Open => "open",
            BetStatus::Locked => "locked",
            BetStatus::Resolved => "resolved",
            BetStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(BetStatus::Open),
            "locked" => Some(BetStatus::Locked),
            "resolved" => Some(BetStatus::Resolved),
            "cancelled" => Some(BetStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerResult {
    Pending,
    Win,
    Lose,
}

impl WagerResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerResult::Pending => "pending",
            WagerResult::Win => "win",
            WagerResult::Lose => "lose",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WagerResult::Pending),
            "win" => Some(WagerResult::Win),
            "lose" => Some(WagerResult::Lose),
            _ => None,
        }
    }
}

/// A participant. Created lazily on first interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub handle: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A bounded wagering period. At most one round is active at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
}

/// A proposition with 2-8 mutually exclusive options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: BetId,
    pub round_id: Option<RoundId>,
    pub question: String,
    pub kind: BetKind,
    pub status: BetStatus,
    pub created_at: DateTime<Utc>,
    pub options: Vec<BetOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetOption {
    pub id: OptionId,
    pub bet_id: BetId,
    pub label: String,
    /// Set exactly once, at resolution.
    pub is_winner: bool,
}

/// A user's stake on one option of one bet, drawn from one pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub user_id: UserId,
    pub bet_id: BetId,
    pub option_id: OptionId,
    pub amount: i64,
    pub pool: Pool,
    pub result: WagerResult,
    pub payout: i64,
    pub placed_at: DateTime<Utc>,
}

/// One bankroll row as captured by the round-end settlement snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollSnapshotEntry {
    pub user_id: UserId,
    pub balance: i64,
    pub from_wallet: bool,
}

/// Aggregate view of the stakes on a bet: total pot, participant count and
/// per-option totals, for the dispatch layer to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetWagerSummary {
    pub bet_id: BetId,
    pub total_pot: i64,
    pub participants: i64,
    pub option_totals: Vec<OptionTotal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionTotal {
    pub option_id: OptionId,
    pub label: String,
    pub total: i64,
}
