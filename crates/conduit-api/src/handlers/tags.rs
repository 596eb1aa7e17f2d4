use std::sync::Arc;

use axum::{extract::State, Json};
use conduit_db::tags;

use crate::error::ApiResult;
use crate::models::{ErrorResponse, TagList};
use crate::AppState;

/// List every tag in use
#[utoipa::path(
    get,
    path = "/api/tags",
    responses(
        (status = 200, description = "All tags, sorted", body = TagList),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "tags"
)]
pub async fn list_tags(State(state): State<Arc<AppState>>) -> ApiResult<Json<TagList>> {
    let tags = tags::list(&state.db).await?;
    Ok(Json(TagList { tags }))
}
