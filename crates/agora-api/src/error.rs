use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use agora_db::ForumError;
use agora_types::api::ErrorBody;

/// `ForumError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ForumError);

impl From<ForumError> for ApiError {
    fn from(e: ForumError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ForumError::Validation(_) | ForumError::InvalidReaction(_) => StatusCode::BAD_REQUEST,
            ForumError::Unauthorized => StatusCode::UNAUTHORIZED,
            ForumError::NotFound(_) => StatusCode::NOT_FOUND,
            ForumError::Conflict(_) => StatusCode::CONFLICT,
            ForumError::Hashing(_) | ForumError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.0.is_internal() {
            error!("Request failed: {}", self.0);
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
