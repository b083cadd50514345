use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

use crate::{ForumError, Result};

/// One-way password hashing capability.
pub trait PasswordScheme: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// False for a wrong password and for a digest that cannot be parsed.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

/// Argon2id with default parameters, PHC string output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Scheme;

impl PasswordScheme for Argon2Scheme {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ForumError::Hashing(e.to_string()))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}
