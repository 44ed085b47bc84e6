//! Durable storage: connection/schema management, identity resolution and
//! the atomic balance primitives everything else is built on.

pub mod balances;
pub mod db;
pub mod users;
