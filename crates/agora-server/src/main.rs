mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use agora_api::error::ApiError;
use agora_api::middleware::bearer_token;
use agora_api::{AppState, AppStateInner};
use agora_auth::Argon2Scheme;
use agora_db::{Database, ForumError, now_millis};
use agora_gateway::connection;
use agora_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Schema is applied here, before anything can touch the store
    let db = Arc::new(Database::open(&config.db_path)?);

    let state = AppStateInner::new(
        db,
        Arc::new(Argon2Scheme),
        config.session_ttl,
        Dispatcher::new(),
    );

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = agora_api::router(state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Agora server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also come as `?token=`.
async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = bearer_token(&headers).or(query.token) else {
        return ApiError(ForumError::Unauthorized).into_response();
    };

    let sessions = state.sessions.clone();
    let presented = token.clone();
    let user = match tokio::task::spawn_blocking(move || sessions.authenticate(&presented, now_millis())).await {
        Ok(Ok(user)) => user,
        Ok(Err(e)) => {
            warn!("Gateway upgrade refused: {}", e);
            return ApiError(e).into_response();
        }
        Err(e) => {
            return ApiError(ForumError::Persistence(format!("spawn_blocking join error: {e}")))
                .into_response();
        }
    };

    let ctx = state.gateway();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx, user, token))
}
