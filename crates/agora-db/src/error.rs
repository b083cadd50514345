use rusqlite::ErrorCode;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ForumError>;

#[derive(Debug, Error)]
pub enum ForumError {
    /// Malformed or out-of-range input; names the offending field(s)
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid reaction: {0}")]
    InvalidReaction(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Unique nickname/email already registered
    #[error("already taken: {0}")]
    Conflict(String),

    /// Missing, unknown, revoked or expired session
    #[error("unauthorized")]
    Unauthorized,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl ForumError {
    /// Server-side failures whose details stay out of client responses.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Hashing(_) | Self::Persistence(_))
    }
}

impl From<rusqlite::Error> for ForumError {
    fn from(e: rusqlite::Error) -> Self {
        error!("Store call failed: {}", e);
        Self::Persistence(e.to_string())
    }
}

/// Constraint kind carried by a failed statement, if any.
pub(crate) fn constraint_violation(e: &rusqlite::Error) -> Option<i32> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            Some(err.extended_code)
        }
        _ => None,
    }
}
