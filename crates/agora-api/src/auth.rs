use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use agora_db::now_millis;
use agora_types::api::{AuthResponse, LoginRequest, RegisterRequest};
use agora_types::models::User;

use crate::error::ApiError;
use crate::{AppState, blocking};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = blocking(move || {
        let user = state.identity.register(req)?;
        let session = state.sessions.issue(user.id)?;
        Ok(AuthResponse {
            user,
            token: session.token,
            expires_at: session.expires_at,
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Any earlier session of this user stops working, live connections included.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.clone();
    let response = blocking(move || {
        let row = store.identity.login(&req.identifier, &req.password)?;
        let session = store.sessions.issue(row.id)?;
        Ok(AuthResponse {
            user: row.profile(),
            token: session.token,
            expires_at: session.expires_at,
        })
    })
    .await?;

    let dropped = state.dispatcher.disconnect_user(response.user.id).await;
    if dropped > 0 {
        info!("Closed {} live connections of {} after a new login", dropped, response.user.id);
    }

    Ok(Json(response))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.clone();
    let user_id = user.id;
    blocking(move || {
        store.sessions.revoke(user_id)?;
        store.db.touch_last_seen(user_id, now_millis())
    })
    .await?;

    state.dispatcher.disconnect_user(user_id).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(Extension(user): Extension<User>) -> Json<User> {
    Json(user)
}
