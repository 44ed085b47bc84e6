//! End-of-round reward distribution: ranking and the multiplier schedule.
//!
//! Pure computation over a snapshot of bankroll entries; the session manager
//! applies the resulting wallet credits. Multiplier arithmetic is integer
//! tenths so the floor is exact and runs are deterministic.

use serde::{Deserialize, Serialize};

use crate::models::{BankrollSnapshotEntry, RoundId, UserId};

/// Rank-dependent multiplier, in tenths. The schedule applies only to
/// entries whose bankroll was seeded from the wallet; everything else passes
/// through at 1.0x.
fn multiplier_tenths(rank: usize, from_wallet: bool) -> i64 {
    if !from_wallet {
        return 10;
    }
    match rank {
        1 => 25,
        2 => 22,
        3 => 20,
        4 => 18,
        _ => 16,
    }
}

/// One line of the round-end settlement report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardLine {
    pub rank: usize,
    pub user_id: UserId,
    pub original_balance: i64,
    pub multiplier: f64,
    pub bonus: i64,
}

/// Ordered settlement report for a closed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub round_id: RoundId,
    pub lines: Vec<RewardLine>,
    pub total_bonus: i64,
}

/// Rank entries by balance descending (ties by user id ascending) and apply
/// the multiplier schedule. Entries with a non-positive balance earn no
/// bonus but still appear in the report.
pub fn settle_round(
    round_id: RoundId,
    mut entries: Vec<BankrollSnapshotEntry>,
) -> SettlementReport {
    entries.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.user_id.cmp(&b.user_id)));

    let mut lines = Vec::with_capacity(entries.len());
    let mut total_bonus = 0;
    for (idx, entry) in entries.iter().enumerate() {
        let rank = idx + 1;
        let tenths = multiplier_tenths(rank, entry.from_wallet);
        let bonus = if entry.balance > 0 {
            entry.balance * tenths / 10
        } else {
            0
        };
        total_bonus += bonus;
        lines.push(RewardLine {
            rank,
            user_id: entry.user_id,
            original_balance: entry.balance,
            multiplier: tenths as f64 / 10.0,
            bonus,
        });
    }

    SettlementReport {
        round_id,
        lines,
        total_bonus,
    }
}
