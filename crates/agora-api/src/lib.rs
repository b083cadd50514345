pub mod auth;
pub mod comments;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};

use agora_auth::{CredentialStore, IdentityGate, PasswordScheme};
use agora_db::{Database, ForumError};
use agora_gateway::GatewayContext;
use agora_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub identity: IdentityGate,
    pub sessions: CredentialStore,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        scheme: Arc<dyn PasswordScheme>,
        session_ttl: Duration,
        dispatcher: Dispatcher,
    ) -> AppState {
        Arc::new(Self {
            identity: IdentityGate::new(db.clone(), scheme),
            sessions: CredentialStore::new(db.clone(), session_ttl),
            db,
            dispatcher,
        })
    }

    /// What a live gateway connection gets to see of the shared state.
    pub fn gateway(&self) -> GatewayContext {
        GatewayContext {
            db: self.db.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

/// Runs a blocking store call off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ForumError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForumError::Persistence(format!("spawn_blocking join error: {e}")))?
        .map_err(ApiError::from)
}

/// All HTTP routes. The live gateway is mounted by the server binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/users", get(messages::list_members))
        .route("/messages/{peer_id}", get(messages::history))
        .route("/messages/{peer_id}/read", post(messages::mark_read))
        .route("/posts", post(comments::create_post))
        .route(
            "/posts/{post_id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/likes", post(reactions::cast_vote))
        .route("/likes/{name_id}/{target_id}", get(reactions::summarize))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
