use std::sync::Arc;
use std::time::Duration;

use agora_db::{Database, now_millis};
use agora_types::models::{Session, User};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use rand_core::{OsRng, RngCore};
use tracing::{debug, info};

use crate::{ForumError, Result};

const TOKEN_BYTES: usize = 32;

/// A token is valid iff it is present and `now` is still before its expiry.
/// Pure: callers pass the token and expiry they read from the store.
pub fn is_valid(token: Option<&str>, expires_at: i64, now: i64) -> bool {
    token.is_some_and(|t| !t.is_empty()) && now < expires_at
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    B64.encode(bytes)
}

/// Issues, checks and revokes the one session slot each user owns.
/// Expired sessions are rejected lazily on use; nothing sweeps them.
#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Database>,
    ttl: Duration,
}

impl CredentialStore {
    pub fn new(db: Arc<Database>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Generates a fresh token, overwriting whatever session the user had.
    pub fn issue(&self, user_id: i64) -> Result<Session> {
        self.issue_at(user_id, now_millis())
    }

    pub fn issue_at(&self, user_id: i64, now: i64) -> Result<Session> {
        let ttl = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let session = Session {
            user_id,
            token: generate_token(),
            expires_at: now.saturating_add(ttl),
        };
        self.db
            .set_session(session.user_id, &session.token, session.expires_at)?;
        info!("Issued session for user {}", user_id);
        Ok(session)
    }

    /// Clears the user's token and expiry. Idempotent.
    pub fn revoke(&self, user_id: i64) -> Result<()> {
        self.db.clear_session(user_id)?;
        info!("Revoked session for user {}", user_id);
        Ok(())
    }

    /// Resolves a presented token to its user, if the stored session still
    /// holds that token and has not expired.
    pub fn authenticate(&self, token: &str, now: i64) -> Result<User> {
        if token.is_empty() {
            return Err(ForumError::Unauthorized);
        }
        let row = self
            .db
            .get_user_by_token(token)?
            .ok_or(ForumError::Unauthorized)?;

        if row.uuid.as_deref() != Some(token) || !is_valid(row.uuid.as_deref(), row.uuid_exp, now) {
            debug!("Rejected expired session for user {}", row.id);
            return Err(ForumError::Unauthorized);
        }
        Ok(row.profile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::models::NewUser;

    fn store() -> (CredentialStore, Arc<Database>, i64) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = db
            .create_user(&NewUser {
                nickname: "alice".into(),
                email: "alice@example.com".into(),
                password: "digest-placeholder".into(),
                firstname: "Alice".into(),
                lastname: "Liddell".into(),
                age: 20,
                gender: "female".into(),
                created_at: 0,
                image: "A.png".into(),
            })
            .unwrap();
        (CredentialStore::new(db.clone(), Duration::from_secs(60)), db, user.id)
    }

    #[test]
    fn predicate_edges() {
        assert!(is_valid(Some("t"), 100, 99));
        assert!(!is_valid(Some("t"), 100, 100));
        assert!(!is_valid(Some("t"), 100, 101));
        assert!(!is_valid(None, 100, 0));
        assert!(!is_valid(Some(""), 100, 0));
    }

    #[test]
    fn issued_session_is_immediately_valid() {
        let (store, db, id) = store();
        let now = 1_000;
        let session = store.issue_at(id, now).unwrap();

        assert_eq!(session.expires_at, now + 60_000);
        assert!(is_valid(Some(&session.token), session.expires_at, now));
        assert_eq!(store.authenticate(&session.token, now).unwrap().id, id);

        let cached = db.get_user_by_id(id).unwrap().unwrap().session().unwrap();
        assert_eq!(cached, session);
    }

    #[test]
    fn expired_session_is_rejected_lazily() {
        let (store, _, id) = store();
        let session = store.issue_at(id, 0).unwrap();

        assert!(!is_valid(Some(&session.token), session.expires_at, session.expires_at + 1));
        assert!(matches!(
            store.authenticate(&session.token, session.expires_at + 1),
            Err(ForumError::Unauthorized)
        ));
    }

    #[test]
    fn revoked_token_no_longer_validates() {
        let (store, db, id) = store();
        let session = store.issue_at(id, 0).unwrap();

        store.revoke(id).unwrap();
        store.revoke(id).unwrap();

        let row = db.get_user_by_id(id).unwrap().unwrap();
        assert!(!is_valid(row.uuid.as_deref(), row.uuid_exp, 1));
        assert!(matches!(store.authenticate(&session.token, 1), Err(ForumError::Unauthorized)));
    }

    #[test]
    fn reissue_invalidates_previous_token() {
        let (store, _, id) = store();
        let first = store.issue_at(id, 0).unwrap();
        let second = store.issue_at(id, 0).unwrap();

        assert_ne!(first.token, second.token);
        assert!(store.authenticate(&first.token, 1).is_err());
        assert!(store.authenticate(&second.token, 1).is_ok());
    }
}
