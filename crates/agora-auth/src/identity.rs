use std::sync::{Arc, LazyLock};

use agora_db::models::UserRow;
use agora_db::{Database, now_millis};
use agora_types::api::RegisterRequest;
use agora_types::models::{NewUser, User};
use regex::Regex;
use tracing::{debug, warn};

use crate::password::PasswordScheme;
use crate::{ForumError, Result};

static NICKNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{3,40}$").expect("nickname pattern"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._+-]{3,20}@[a-zA-Z0-9.-]{3,20}\.[a-zA-Z]{2,10}$").expect("email pattern")
});
static PASSWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.{8,100}$").expect("password pattern"));
static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{3,40}$").expect("name pattern"));
static GENDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(male|female)$").expect("gender pattern"));

const AGE_RANGE: std::ops::RangeInclusive<i64> = 10..=200;

/// Pure field check.
pub fn validate(value: &str, pattern: &Regex) -> bool {
    pattern.is_match(value)
}

/// Normalizes and validates registration input, then replaces the plaintext
/// password with its digest. All fields must pass; the error names every
/// field that did not.
pub fn prepare_new_user(raw: RegisterRequest, scheme: &dyn PasswordScheme) -> Result<NewUser> {
    let nickname = raw.nickname.trim().to_lowercase();
    let email = raw.email.trim().to_lowercase();
    let gender = raw.gender.trim().to_lowercase();
    let firstname = raw.firstname.trim().to_string();
    let lastname = raw.lastname.trim().to_string();

    let checks = [
        ("nickname", validate(&nickname, &NICKNAME)),
        ("email", validate(&email, &EMAIL)),
        ("password", validate(&raw.password, &PASSWORD)),
        ("firstname", validate(&firstname, &NAME)),
        ("lastname", validate(&lastname, &NAME)),
        ("gender", validate(&gender, &GENDER)),
        ("age", AGE_RANGE.contains(&raw.age)),
    ];
    let failed: Vec<&str> = checks
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(field, _)| *field)
        .collect();
    if !failed.is_empty() {
        return Err(ForumError::Validation(failed.join(", ")));
    }

    let password = scheme.hash(&raw.password)?;
    // NAME guarantees a leading ASCII letter
    let image = format!("{}.png", firstname[..1].to_uppercase());

    Ok(NewUser {
        nickname,
        email,
        password,
        firstname,
        lastname,
        age: raw.age,
        gender,
        created_at: now_millis(),
        image,
    })
}

/// True iff the stored digest still has the expected shape and the
/// plaintext verifies against it.
pub fn verify_credentials(digest: &str, plaintext: &str, scheme: &dyn PasswordScheme) -> bool {
    validate(digest, &PASSWORD) && scheme.verify(plaintext, digest)
}

/// Normalizes `identifier` and rejects anything that is neither a nickname
/// nor an email before `resolve` (the store) is ever called.
pub fn lookup_identity<F>(identifier: &str, resolve: F) -> Result<UserRow>
where
    F: FnOnce(&str) -> Result<Option<UserRow>>,
{
    let identifier = identifier.trim().to_lowercase();
    if !validate(&identifier, &NICKNAME) && !validate(&identifier, &EMAIL) {
        warn!("Rejected malformed login identifier");
        return Err(ForumError::Validation("identifier".into()));
    }
    resolve(&identifier)?.ok_or_else(|| ForumError::NotFound(format!("user {identifier}")))
}

/// Identity operations bound to a store and a hashing scheme.
#[derive(Clone)]
pub struct IdentityGate {
    db: Arc<Database>,
    scheme: Arc<dyn PasswordScheme>,
}

impl IdentityGate {
    pub fn new(db: Arc<Database>, scheme: Arc<dyn PasswordScheme>) -> Self {
        Self { db, scheme }
    }

    pub fn prepare_new_user(&self, raw: RegisterRequest) -> Result<NewUser> {
        prepare_new_user(raw, self.scheme.as_ref())
    }

    /// Validates, hashes and persists a new user.
    pub fn register(&self, raw: RegisterRequest) -> Result<User> {
        let prepared = self.prepare_new_user(raw)?;
        let user = self.db.create_user(&prepared)?;
        debug!("Registered {} ({})", user.nickname, user.id);
        Ok(user)
    }

    pub fn verify_credentials(&self, user: &UserRow, plaintext: &str) -> bool {
        verify_credentials(&user.password, plaintext, self.scheme.as_ref())
    }

    pub fn lookup_identity(&self, identifier: &str) -> Result<UserRow> {
        lookup_identity(identifier, |id| self.db.get_user_by_identifier(id))
    }

    /// Resolves the identifier and checks the password. Unknown users and
    /// wrong passwords are indistinguishable to the caller.
    pub fn login(&self, identifier: &str, password: &str) -> Result<UserRow> {
        let user = match self.lookup_identity(identifier) {
            Ok(user) => user,
            Err(ForumError::NotFound(_)) => return Err(ForumError::Unauthorized),
            Err(e) => return Err(e),
        };
        if !self.verify_credentials(&user, password) {
            warn!("Failed login for user {}", user.id);
            return Err(ForumError::Unauthorized);
        }
        Ok(user)
    }
}
