//! Typed error taxonomy for the ledger engine.
//!
//! Every core operation returns `Result<_, LedgerError>`; the dispatch layer
//! alone translates errors into user-facing messages. Lazy creation of
//! missing wallet/bankroll rows is normal behavior, not an error.

use crate::models::BetId;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed request data: non-positive amount, option count outside [2, 8].
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced bet/option/round/user does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// The entity exists but its state does not permit the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A reservation exceeded the available balance. The balance is unchanged.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    /// Duplicate resolution attempt. No side effects were applied.
    #[error("bet {0} is already resolved")]
    AlreadyResolved(BetId),

    /// Persistence backend failure. The in-flight operation was aborted and
    /// no partial mutation is retained.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
}

impl LedgerError {
    pub(crate) fn not_found(kind: &'static str, id: i64) -> Self {
        Self::NotFound { kind, id }
    }

    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
