use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{AppState, blocking};

/// GET /api/channels/{channel_id}/activity — daily message counts.
pub async fn channel_activity(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let activity = blocking(&state, move |db| db.channel_activity(&channel_id)).await?;
    Ok(Json(activity))
}
