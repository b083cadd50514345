use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;
use tracing::debug;

use agora_types::api::HistoryQuery;
use agora_types::events::{Envelope, Participants};
use agora_types::models::User;

use crate::error::ApiError;
use crate::{AppState, blocking};

/// Contact list with per-conversation unread counts.
pub async fn list_members(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let members = blocking(move || state.db.list_members(user.id)).await?;
    Ok(Json(members))
}

/// One page of the conversation with `peer_id`, newest first. Pass the
/// `created_at` of the oldest message already held as `before` to page back.
pub async fn history(
    State(state): State<AppState>,
    Path(peer_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let before = query.before.unwrap_or(i64::MAX);
    let messages = blocking(move || state.db.message_history(user.id, peer_id, before)).await?;
    Ok(Json(messages))
}

/// The caller opened the conversation: everything `peer_id` sent them is read.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(peer_id): Path<i64>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let reader_id = user.id;
    let updated = blocking(move || db.mark_read(peer_id, reader_id)).await?;
    debug!("{} read {} messages from {}", reader_id, updated, peer_id);

    let envelope = Envelope::Read {
        message: Participants { sender_id: peer_id, receiver_id: reader_id },
    };
    state.dispatcher.send_to_user(peer_id, envelope.clone()).await;
    state.dispatcher.send_to_user(reader_id, envelope).await;

    Ok(Json(json!({ "updated": updated })))
}
