use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use agora_db::{ForumError, now_millis};

use crate::error::ApiError;
use crate::{AppState, blocking};

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// Resolve the bearer session to its user and attach the `User` to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ForumError::Unauthorized)?;

    let sessions = state.sessions.clone();
    let user = blocking(move || sessions.authenticate(&token, now_millis())).await?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
