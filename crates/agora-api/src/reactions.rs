use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use agora_db::queries::{parse_reaction, parse_target_kind};
use agora_types::api::{CastVoteRequest, ReactionResponse};
use agora_types::events::ReactionCounts;
use agora_types::models::{ReactionTarget, User};

use crate::error::ApiError;
use crate::{AppState, blocking};

/// Cast or replace the caller's vote, then push the new counts to everyone.
pub async fn cast_vote(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CastVoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (target, vote) = parse_reaction(&req.name_id, req.target_id, req.like)?;

    let db = state.db.clone();
    let summary = blocking(move || {
        db.cast_vote(user.id, target, vote)?;
        db.reaction_summary(target, Some(user.id))
    })
    .await?;

    state.dispatcher.broadcast_reaction(ReactionCounts {
        target,
        likes: summary.likes,
        dislikes: summary.dislikes,
    });

    Ok(Json(ReactionResponse { target, summary }))
}

pub async fn summarize(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((name_id, target_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let target = ReactionTarget::new(parse_target_kind(&name_id)?, target_id);
    let summary = blocking(move || state.db.reaction_summary(target, Some(user.id))).await?;
    Ok(Json(ReactionResponse { target, summary }))
}
