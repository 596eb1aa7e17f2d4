//! Mapping of domain failures onto HTTP responses

use std::collections::BTreeMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conduit_auth::JwtError;
use conduit_db::{FieldErrors, StoreError};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::ErrorResponse;

/// Key used for errors not tied to a request field
pub const DETAIL_KEY: &str = "detail";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Shorthand for a `detail` validation error
    pub fn bad_request(message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(DETAIL_KEY, message);
        ApiError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_FAILED",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn to_body(&self) -> ErrorResponse {
        let errors = match self {
            ApiError::Validation(fields) => fields.clone().into_inner(),
            ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::NotFound(message) => detail(message.clone()),
            // Internal details stay in the logs
            ApiError::Internal(_) => detail("Internal server error.".to_string()),
        };

        ErrorResponse {
            errors,
            code: self.code().to_string(),
        }
    }
}

fn detail(message: String) -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([(DETAIL_KEY.to_string(), vec![message])])
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            error!("Request failed: {}", message);
        }
        (self.status(), Json(self.to_body())).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(fields) => ApiError::Validation(fields),
            StoreError::Unauthorized(message) => ApiError::Unauthorized(message),
            StoreError::Forbidden(message) => ApiError::Forbidden(message),
            StoreError::NotFound(message) => ApiError::NotFound(message),
            StoreError::Password(e) => ApiError::Internal(e.to_string()),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::TokenExpired => ApiError::Unauthorized("Token has expired.".to_string()),
            JwtError::InvalidValidity => {
                ApiError::Internal("Token validity is out of range".to_string())
            }
            JwtError::InvalidToken(reason) => {
                warn!("Rejected token: {}", reason);
                ApiError::Unauthorized("Invalid authentication token.".to_string())
            }
            JwtError::EncodingError(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// JSON body extractor whose rejections use the API error format
#[derive(Debug, Clone, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose rejections use the API error format
#[derive(Debug, Clone, Default, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path parameter extractor whose rejections use the API error format
#[derive(Debug, Clone, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_status_codes() {
        let cases = [
            (
                StoreError::Validation(FieldErrors::new()),
                StatusCode::BAD_REQUEST,
            ),
            (
                StoreError::Unauthorized("no".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (StoreError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (StoreError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                StoreError::Database(sea_orm::DbErr::Custom("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (store_error, status) in cases {
            assert_eq!(ApiError::from(store_error).status(), status);
        }
    }

    #[test]
    fn non_field_errors_use_detail_key() {
        let body = ApiError::NotFound("An article with this slug does not exist.".into()).to_body();

        assert_eq!(body.code, "NOT_FOUND");
        assert_eq!(
            body.errors[DETAIL_KEY],
            vec!["An article with this slug does not exist."]
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let body = ApiError::Internal("connection refused at 10.0.0.3".into()).to_body();

        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.errors[DETAIL_KEY], vec!["Internal server error."]);
    }

    #[test]
    fn field_errors_are_passed_through() {
        let mut fields = FieldErrors::new();
        fields.add("email", "Enter a valid email address.");
        fields.add("password", "Ensure this field has at least 8 characters.");

        let body = ApiError::Validation(fields).to_body();

        assert_eq!(body.code, "VALIDATION_FAILED");
        assert_eq!(body.errors.len(), 2);
        assert!(body.errors.contains_key("email"));
    }

    #[test]
    fn expired_tokens_are_unauthorized() {
        assert_eq!(
            ApiError::from(JwtError::TokenExpired).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
