pub mod connection;
pub mod dispatcher;

use std::sync::Arc;

use agora_db::{Database, ForumError};

use crate::dispatcher::Dispatcher;

/// Everything a live connection needs: the store and the fan-out hub.
#[derive(Clone)]
pub struct GatewayContext {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
}

/// Runs a blocking store call off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ForumError>
where
    F: FnOnce() -> Result<T, ForumError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForumError::Persistence(format!("spawn_blocking join error: {e}")))?
}
