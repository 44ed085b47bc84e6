//! Identity resolution: front-end handle to stable internal user id.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::info;

use crate::error::LedgerResult;
use crate::models::User;
use crate::store::db::{parse_timestamp, LedgerDb};

/// Lazily-creating user directory keyed by the front end's stable handle.
#[derive(Clone)]
pub struct UserDirectory {
    db: LedgerDb,
}

impl UserDirectory {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Resolve a handle to an internal user, creating the row on first
    /// interaction.
    pub async fn ensure_user(&self, handle: &str, display_name: &str) -> LedgerResult<User> {
        let conn = self.db.conn.lock().await;

        let existing = conn
            .query_row(
                "SELECT id, handle, display_name, created_at FROM users WHERE handle = ?1",
                params![handle],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        handle: row.get(1)?,
                        display_name: row.get(2)?,
                        created_at: parse_timestamp(&row.get::<_, String>(3)?)?,
                    })
                },
            )
            .optional()?;

        if let Some(user) = existing {
            return Ok(user);
        }

        let now = Utc::now();
        conn.execute(
            "INSERT INTO users (handle, display_name, created_at) VALUES (?1, ?2, ?3)",
            params![handle, display_name, now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        info!("Created user {} for handle {}", id, handle);

        Ok(User {
            id,
            handle: handle.to_string(),
            display_name: display_name.to_string(),
            created_at: now,
        })
    }
}
