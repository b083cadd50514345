use serde::{Deserialize, Serialize};

use crate::models::{ReactionSummary, ReactionTarget, User};

// -- Auth --

/// Raw registration input, before normalization and hashing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub nickname: String,
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub age: i64,
    pub gender: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Nickname or email.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: i64,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Epoch-millisecond cursor: the `created_at` of the oldest message the
    /// caller already holds. Absent means start from the newest.
    pub before: Option<i64>,
}

// -- Posts & comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
}

// -- Reactions --

/// Kept loosely typed so bad discriminators and vote values surface as
/// `InvalidReaction` rather than as a body parse failure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastVoteRequest {
    pub name_id: String,
    pub target_id: i64,
    pub like: i64,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub target: ReactionTarget,
    #[serde(flatten)]
    pub summary: ReactionSummary,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
