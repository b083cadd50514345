use tracing::debug;

use crate::{Database, ForumError, Result};

impl Database {
    /// Stores `token` as the user's only session, replacing any prior one.
    pub fn set_session(&self, user_id: i64, token: &str, expires_at: i64) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET uuid = ?1, uuid_exp = ?2 WHERE id = ?3",
                rusqlite::params![token, expires_at, user_id],
            )?;
            if updated == 0 {
                return Err(ForumError::NotFound(format!("user {user_id}")));
            }
            debug!("Session issued for user {}", user_id);
            Ok(())
        })
    }

    /// Clears the session slot. Idempotent.
    pub fn clear_session(&self, user_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET uuid = NULL, uuid_exp = 0 WHERE id = ?1",
                [user_id],
            )?;
            debug!("Session cleared for user {}", user_id);
            Ok(())
        })
    }
}
