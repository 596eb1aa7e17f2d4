use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use conduit_db::accounts::{self, NewUser, UserChanges};
use tracing::{debug, info};

use crate::error::{ApiError, ApiJson, ApiResult};
use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

/// Register a new user
///
/// Returns the created user with a session token.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 400, description = "Invalid or already taken fields", body = ErrorResponse),
        (status = 403, description = "Registration is disabled", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    if !state.allow_signup {
        return Err(ApiError::Forbidden(
            "Registration is disabled on this server.".to_string(),
        ));
    }

    let account = accounts::register(
        &state.db,
        NewUser {
            email: req.user.email,
            username: req.user.username,
            password: req.user.password,
        },
    )
    .await?;

    let token = state.jwt.issue(account.user.id)?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user: User::new(account, token),
        }),
    ))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = UserResponse),
        (status = 400, description = "Email or password missing", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account deactivated", body = ErrorResponse)
    ),
    tag = "users"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<UserResponse>> {
    let account = accounts::authenticate(&state.db, &req.user.email, &req.user.password).await?;
    let token = state.jwt.issue(account.user.id)?;

    info!("User logged in: {}", account.user.username);

    Ok(Json(UserResponse {
        user: User::new(account, token),
    }))
}

/// Get the current user
///
/// The response carries a freshly issued token.
#[utoipa::path(
    get,
    path = "/api/user",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "users"
)]
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<Json<UserResponse>> {
    debug!("Getting current user: {}", auth.user_id);

    let account = accounts::find_active(&state.db, auth.user_id).await?;
    let token = state.jwt.issue(account.user.id)?;

    Ok(Json(UserResponse {
        user: User::new(account, token),
    }))
}

/// Update the current user
#[utoipa::path(
    put,
    path = "/api/user",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid or already taken fields", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("token" = [])),
    tag = "users"
)]
pub async fn update_current_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let changes = UserChanges {
        email: req.user.email,
        username: req.user.username,
        password: req.user.password,
        bio: req.user.bio,
        image: req.user.image,
    };

    let account = accounts::update(&state.db, auth.user_id, changes).await?;
    let token = state.jwt.issue(account.user.id)?;

    Ok(Json(UserResponse {
        user: User::new(account, token),
    }))
}
