use agora_types::models::{NewUser, User, UserSummary};
use rusqlite::{Connection, ffi};
use tracing::debug;

use super::OptionalExt;
use crate::error::constraint_violation;
use crate::models::UserRow;
use crate::{Database, ForumError, Result};

impl Database {
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        self.with_conn(|conn| {
            let inserted = conn.query_row(
                "INSERT INTO users (nickname, email, password, firstname, lastname, age, gender, created_at, image)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 RETURNING id",
                rusqlite::params![
                    user.nickname,
                    user.email,
                    user.password,
                    user.firstname,
                    user.lastname,
                    user.age,
                    user.gender,
                    user.created_at,
                    user.image,
                ],
                |row| row.get::<_, i64>(0),
            );

            let id = match inserted {
                Ok(id) => id,
                Err(e) if constraint_violation(&e) == Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    return Err(ForumError::Conflict("nickname or email".into()));
                }
                Err(e) => return Err(e.into()),
            };

            debug!("Created user {} ({})", user.nickname, id);
            Ok(User {
                id,
                nickname: user.nickname.clone(),
                email: user.email.clone(),
                firstname: user.firstname.clone(),
                lastname: user.lastname.clone(),
                age: user.age,
                gender: user.gender.clone(),
                created_at: user.created_at,
                last_seen: 0,
                image: user.image.clone(),
            })
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Exact match on nickname OR email. Callers must have validated the
    /// identifier's shape first.
    pub fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1 OR nickname = ?1", identifier))
    }

    pub fn get_user_by_token(&self, token: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "uuid = ?1", token))
    }

    pub fn touch_last_seen(&self, user_id: i64, at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = ?1 WHERE id = ?2",
                rusqlite::params![at, user_id],
            )?;
            Ok(())
        })
    }

    /// Every user except the viewer, most recent conversation first, with the
    /// number of messages the viewer has not read yet.
    pub fn list_members(&self, viewer_id: i64) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.nickname, u.firstname, u.lastname, u.image, u.last_seen,
                    (SELECT MAX(m.created_at) FROM messages m
                      WHERE (m.sender_id = u.id AND m.receiver_id = ?1)
                         OR (m.sender_id = ?1 AND m.receiver_id = u.id)) AS last_message_at,
                    (SELECT COUNT(*) FROM messages m
                      WHERE m.sender_id = u.id AND m.receiver_id = ?1 AND m.is_read = 0) AS unread
                 FROM users u
                 WHERE u.id != ?1
                 ORDER BY last_message_at IS NULL, last_message_at DESC, u.nickname ASC",
            )?;

            let rows = stmt
                .query_map([viewer_id], |row| {
                    Ok(UserSummary {
                        id: row.get(0)?,
                        nickname: row.get(1)?,
                        firstname: row.get(2)?,
                        lastname: row.get(3)?,
                        image: row.get(4)?,
                        last_seen: row.get(5)?,
                        last_message_at: row.get(6)?,
                        unread: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user<P: rusqlite::ToSql>(conn: &Connection, filter: &str, param: P) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {filter}", UserRow::COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([param], UserRow::from_row).optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testing::{new_user, seed_user};

    #[test]
    fn duplicate_nickname_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "alice");

        let mut dup = new_user("alice");
        dup.email = "other@example.com".into();
        assert!(matches!(db.create_user(&dup), Err(ForumError::Conflict(_))));
    }

    #[test]
    fn identifier_matches_nickname_or_email() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_user(&db, "alice");

        assert_eq!(db.get_user_by_identifier("alice").unwrap().unwrap().id, id);
        assert_eq!(db.get_user_by_identifier("alice@example.com").unwrap().unwrap().id, id);
        assert!(db.get_user_by_identifier("bob").unwrap().is_none());
    }

    #[test]
    fn members_ordered_by_latest_conversation_with_unread_counts() {
        let db = Database::open_in_memory().unwrap();
        let me = seed_user(&db, "me");
        let ann = seed_user(&db, "ann");
        let bob = seed_user(&db, "bob");
        let cat = seed_user(&db, "cat");

        db.insert_message(ann, me, "hi", 10).unwrap();
        db.insert_message(bob, me, "one", 20).unwrap();
        db.insert_message(bob, me, "two", 30).unwrap();
        db.insert_message(me, bob, "back", 40).unwrap();

        let members = db.list_members(me).unwrap();
        let order: Vec<i64> = members.iter().map(|m| m.id).collect();
        assert_eq!(order, vec![bob, ann, cat]);
        assert_eq!(members[0].unread, 2);
        assert_eq!(members[0].last_message_at, Some(40));
        assert_eq!(members[1].unread, 1);
        assert_eq!(members[2].last_message_at, None);
        assert!(members.iter().all(|m| m.id != me));
    }
}
