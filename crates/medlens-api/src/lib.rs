pub mod channels;
pub mod reports;
pub mod search;

use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get};
use tracing::error;

use medlens_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/reports/top-products", get(reports::top_products))
        .route("/api/channels/{channel_id}/activity", get(channels::channel_activity))
        .route("/api/search/messages", get(search::search_messages))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Run a blocking DB query off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB query error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
