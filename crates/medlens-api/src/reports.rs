use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{AppState, blocking};

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct TopProductsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// GET /api/reports/top-products — most frequent words across all messages.
pub async fn top_products(
    State(state): State<AppState>,
    Query(query): Query<TopProductsQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.min(MAX_LIMIT);
    let mentions = blocking(&state, move |db| db.top_products(limit)).await?;
    Ok(Json(mentions))
}
