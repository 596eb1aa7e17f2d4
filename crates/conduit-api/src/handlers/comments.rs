use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use conduit_db::comments;

use crate::error::{ApiJson, ApiPath, ApiResult};
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::models::*;
use crate::AppState;

/// List the comments on an article, newest first
#[utoipa::path(
    get,
    path = "/api/articles/{slug}/comments",
    params(
        ("slug" = String, Path, description = "Article slug")
    ),
    responses(
        (status = 200, description = "Comments", body = CommentList),
        (status = 404, description = "Article not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    ApiPath(slug): ApiPath<String>,
) -> ApiResult<Json<CommentList>> {
    let records = comments::list_for_article(&state.db, &slug, viewer.profile_id()).await?;

    Ok(Json(CommentList {
        comments: records.into_iter().map(Comment::from).collect(),
    }))
}

/// Comment on an article
#[utoipa::path(
    post,
    path = "/api/articles/{slug}/comments",
    params(
        ("slug" = String, Path, description = "Article slug")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = CommentResponse),
        (status = 400, description = "Blank body", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Article not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "comments"
)]
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(slug): ApiPath<String>,
    ApiJson(req): ApiJson<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentResponse>)> {
    let record = comments::add(&state.db, &slug, auth.profile_id, &req.comment.body).await?;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            comment: Comment::from(record),
        }),
    ))
}

/// Delete a comment
///
/// The comment must belong to the article in the path and only its author may
/// delete it.
#[utoipa::path(
    delete,
    path = "/api/articles/{slug}/comments/{id}",
    params(
        ("slug" = String, Path, description = "Article slug"),
        ("id" = i32, Path, description = "Comment ID")
    ),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Article or comment not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "comments"
)]
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath((slug, id)): ApiPath<(String, i32)>,
) -> ApiResult<StatusCode> {
    comments::delete(&state.db, &slug, id, auth.profile_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
