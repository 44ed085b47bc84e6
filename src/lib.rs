//! Wagerbank: ledger & settlement engine for time-boxed group wagering rounds.
//!
//! Tracks virtual credits for many participants across repeated rounds. Each
//! participant holds a persistent wallet plus a round-scoped bankroll; stakes
//! go onto multi-option bets, an operator resolves each bet to trigger payout,
//! and round end converts remaining bankrolls into wallet credits under a
//! rank-dependent multiplier schedule.
//!
//! # Components
//!
//! - [`store::db`] - SQLite connection and schema (WAL, single writer)
//! - [`store::users`] - handle -> internal user id resolution, lazy creation
//! - [`store::balances`] - atomic mutations on the two credit pools
//! - [`engine::registry`] - bet/option lifecycle and wager acceptance
//! - [`engine::settlement`] - per-bet resolution and payout (fixed 2x)
//! - [`engine::session`] - round lifecycle, single-active-round invariant
//! - [`engine::rewards`] - end-of-round ranking and reward computation
//!
//! The interactive front end and command routing live outside this crate:
//! every operation returns data or a typed [`LedgerError`], never user-facing
//! text.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;

pub use config::Config;
pub use engine::registry::BetRegistry;
pub use engine::rewards::SettlementReport;
pub use engine::session::SessionManager;
pub use engine::settlement::SettlementEngine;
pub use error::{LedgerError, LedgerResult};
pub use store::balances::BalanceStore;
pub use store::db::LedgerDb;
pub use store::users::UserDirectory;
