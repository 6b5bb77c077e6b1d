use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{AppState, blocking};

const MIN_QUERY_CHARS: usize = 3;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

/// GET /api/search/messages?query=... — substring search, at most 100 hits.
pub async fn search_messages(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    if search.query.chars().count() < MIN_QUERY_CHARS {
        return Err(StatusCode::BAD_REQUEST);
    }

    let hits = blocking(&state, move |db| db.search_messages(&search.query)).await?;
    Ok(Json(hits))
}
