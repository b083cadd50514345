/// Database row types that carry more than the public models do.
/// Distinct from agora-types so credentials never reach the wire.
use agora_types::models::{Session, User};
use rusqlite::Row;

/// Full `users` row, including the password digest and the session slot.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub uuid: Option<String>,
    pub uuid_exp: i64,
    pub nickname: String,
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub age: i64,
    pub gender: String,
    pub created_at: i64,
    pub last_seen: i64,
    pub image: String,
}

impl UserRow {
    pub(crate) const COLUMNS: &'static str = "id, uuid, uuid_exp, nickname, email, password, \
         firstname, lastname, age, gender, created_at, last_seen, image";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            uuid_exp: row.get(2)?,
            nickname: row.get(3)?,
            email: row.get(4)?,
            password: row.get(5)?,
            firstname: row.get(6)?,
            lastname: row.get(7)?,
            age: row.get(8)?,
            gender: row.get(9)?,
            created_at: row.get(10)?,
            last_seen: row.get(11)?,
            image: row.get(12)?,
        })
    }

    pub fn profile(&self) -> User {
        User {
            id: self.id,
            nickname: self.nickname.clone(),
            email: self.email.clone(),
            firstname: self.firstname.clone(),
            lastname: self.lastname.clone(),
            age: self.age,
            gender: self.gender.clone(),
            created_at: self.created_at,
            last_seen: self.last_seen,
            image: self.image.clone(),
        }
    }

    /// The stored session slot, if one was ever issued and not revoked.
    pub fn session(&self) -> Option<Session> {
        self.uuid.as_ref().map(|token| Session {
            user_id: self.id,
            token: token.clone(),
            expires_at: self.uuid_exp,
        })
    }
}
