//! Environment-driven configuration.

use crate::models::DEFAULT_OPENING_BALANCE;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub opening_balance: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./wagerbank.db".to_string());

        let opening_balance = std::env::var("OPENING_BALANCE")
            .unwrap_or_else(|_| DEFAULT_OPENING_BALANCE.to_string())
            .parse()
            .unwrap_or(DEFAULT_OPENING_BALANCE);

        Ok(Self {
            database_path,
            opening_balance,
        })
    }
}
