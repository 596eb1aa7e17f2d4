use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use conduit_db::profiles;
use tracing::debug;

use crate::error::{ApiPath, ApiResult};
use crate::middleware::{AuthUser, MaybeAuthUser};
use crate::models::*;
use crate::AppState;

/// Get a profile by username
#[utoipa::path(
    get,
    path = "/api/profiles/{username}",
    params(
        ("username" = String, Path, description = "Username")
    ),
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse)
    ),
    tag = "profiles"
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<Json<ProfileResponse>> {
    let record = profiles::load(&state.db, &username, viewer.profile_id()).await?;

    Ok(Json(ProfileResponse {
        profile: Profile::from(&record),
    }))
}

/// Follow a profile
#[utoipa::path(
    post,
    path = "/api/profiles/{username}/follow",
    params(
        ("username" = String, Path, description = "Username to follow")
    ),
    responses(
        (status = 201, description = "Now following", body = ProfileResponse),
        (status = 400, description = "Cannot follow yourself", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "profiles"
)]
pub async fn follow_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<(StatusCode, Json<ProfileResponse>)> {
    debug!("{} follows {}", auth.username, username);

    let record = profiles::follow_username(&state.db, auth.profile_id, &username).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProfileResponse {
            profile: Profile::from(&record),
        }),
    ))
}

/// Unfollow a profile
#[utoipa::path(
    delete,
    path = "/api/profiles/{username}/follow",
    params(
        ("username" = String, Path, description = "Username to unfollow")
    ),
    responses(
        (status = 200, description = "No longer following", body = ProfileResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "profiles"
)]
pub async fn unfollow_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<Json<ProfileResponse>> {
    debug!("{} unfollows {}", auth.username, username);

    let record = profiles::unfollow_username(&state.db, auth.profile_id, &username).await?;

    Ok(Json(ProfileResponse {
        profile: Profile::from(&record),
    }))
}
