use agora_types::models::Message;
use rusqlite::{Row, ffi};
use tracing::debug;

use super::check_content;
use crate::error::constraint_violation;
use crate::{Database, ForumError, Result, now_millis};

/// Maximum number of messages returned by one history page.
pub const HISTORY_PAGE_SIZE: u32 = 10;

impl Database {
    /// Persists a message. Id and creation timestamp are assigned by the store.
    pub fn store_message(&self, sender_id: i64, receiver_id: i64, content: &str) -> Result<Message> {
        self.insert_message(sender_id, receiver_id, content, now_millis())
    }

    /// `created_at` is `max(at, newest + 1)` inside the insert itself, so it
    /// strictly increases with insertion order.
    pub(crate) fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        content: &str,
        at: i64,
    ) -> Result<Message> {
        check_content("content", content, Message::MAX_CHARS)?;
        if sender_id == receiver_id {
            return Err(ForumError::Validation("receiver must be another user".into()));
        }

        self.with_conn(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO messages (sender_id, receiver_id, content, created_at, is_read)
                 VALUES (?1, ?2, ?3, MAX(?4, COALESCE((SELECT MAX(created_at) FROM messages), 0) + 1), 0)
                 RETURNING id, created_at",
                rusqlite::params![sender_id, receiver_id, content, at],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            );

            let (id, created_at) = match inserted {
                Ok(v) => v,
                Err(e) if constraint_violation(&e) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    return Err(ForumError::NotFound(format!("user {receiver_id}")));
                }
                Err(e) => return Err(e.into()),
            };

            debug!("Stored message {} from {} to {}", id, sender_id, receiver_id);
            Ok(Message {
                id,
                sender_id,
                receiver_id,
                content: content.to_string(),
                created_at,
                is_read: false,
            })
        })
    }

    /// Up to [`HISTORY_PAGE_SIZE`] messages exchanged between the two users in
    /// either direction, strictly older than `before`, newest first.
    pub fn message_history(&self, user_a: i64, user_b: i64, before: i64) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, created_at, is_read
                 FROM messages
                 WHERE created_at < ?1
                   AND ((sender_id = ?2 AND receiver_id = ?3) OR (sender_id = ?3 AND receiver_id = ?2))
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(
                    rusqlite::params![before, user_a, user_b, HISTORY_PAGE_SIZE],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Marks every unread message from `sender_id` to `receiver_id` as read.
    /// The reverse direction is never touched. Returns the number of rows flipped.
    pub fn mark_read(&self, sender_id: i64, receiver_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                rusqlite::params![sender_id, receiver_id],
            )?;
            Ok(updated)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        is_read: row.get(5)?,
    })
}
