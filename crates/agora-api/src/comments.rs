use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use agora_db::{ForumError, now_millis};
use agora_types::api::{CreateCommentRequest, CreatePostRequest};
use agora_types::models::User;

use crate::error::ApiError;
use crate::{AppState, blocking};

pub async fn create_post(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post =
        blocking(move || state.db.create_post(user.id, &req.title, &req.content, now_millis())).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<i64>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment =
        blocking(move || state.db.create_comment(user.id, post_id, &req.content, now_millis())).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Comments newest first, each with its live reaction summary and author.
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = blocking(move || {
        if !state.db.post_exists(post_id)? {
            return Err(ForumError::NotFound(format!("post {post_id}")));
        }
        state.db.list_comments(post_id, Some(user.id))
    })
    .await?;
    Ok(Json(comments))
}
