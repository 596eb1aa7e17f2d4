//! Token Authentication Middleware
//!
//! Reads the `Authorization` header on every request. Requests without it pass
//! through anonymously; requests carrying a token are resolved to an active user
//! and the result is made available to handlers through [`AuthUser`] and
//! [`MaybeAuthUser`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use conduit_auth::{JwtClaims, JwtValidator, TOKEN_ISSUER};
use conduit_db::accounts;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Authenticated user context resolved from a session token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub username: String,
    /// The token the request was made with
    pub token: String,
}

/// Signing and validation of session tokens
#[derive(Clone)]
pub struct JwtState {
    secret: Arc<Vec<u8>>,
    pub validator: Arc<JwtValidator>,
    /// Validity of newly issued tokens
    pub ttl: Duration,
}

impl JwtState {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            secret: Arc::new(secret.to_vec()),
            validator: Arc::new(JwtValidator::new(secret).with_issuer(TOKEN_ISSUER)),
            ttl,
        }
    }

    /// Issue a session token for `user_id`
    pub fn issue(&self, user_id: Uuid) -> Result<String, ApiError> {
        let claims = JwtClaims::session(user_id.to_string(), self.ttl)?;
        Ok(JwtValidator::encode(&self.secret, &claims)?)
    }

    /// Validate `token` and return the user id it was issued for
    pub fn verify(&self, token: &str) -> Result<Uuid, ApiError> {
        let claims = self.validator.validate(token)?;
        Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid authentication token.".to_string()))
    }
}

fn invalid_header() -> ApiError {
    ApiError::Unauthorized(
        "Invalid Authorization header format. Expected 'Token <token>'.".to_string(),
    )
}

/// Pull the token out of an `Authorization` header value
///
/// Accepts the `Token` and `Bearer` schemes, case-insensitively.
pub fn extract_token(header_value: &str) -> Result<&str, ApiError> {
    let (scheme, token) = header_value
        .trim()
        .split_once(' ')
        .ok_or_else(invalid_header)?;

    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return Err(invalid_header());
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(invalid_header());
    }

    Ok(token)
}

/// Authentication middleware
///
/// # Errors
/// Returns 401 Unauthorized if the header is malformed, the token is invalid or
/// expired, or its user no longer exists; 403 Forbidden if the user has been
/// deactivated.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map(str::to_owned));

    let token = match header_value {
        Some(Ok(value)) => extract_token(&value)?.to_string(),
        Some(Err(_)) => return Err(invalid_header()),
        None => return Ok(next.run(request).await),
    };

    let user_id = state.jwt.verify(&token)?;
    let account = accounts::find_active(&state.db, user_id).await?;
    debug!("Authenticated request as {}", account.user.username);

    request.extensions_mut().insert(AuthUser {
        user_id: account.user.id,
        profile_id: account.profile.id,
        username: account.user.username,
        token,
    });

    Ok(next.run(request).await)
}

/// Requires an authenticated user; rejects anonymous requests with 401
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
        })
    }
}

/// The authenticated user, if any
#[derive(Debug, Clone, Default)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    /// Profile id of the viewer, `None` for anonymous requests
    pub fn profile_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|user| user.profile_id)
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<AuthUser>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_accepts_token_and_bearer_schemes() {
        assert_eq!(extract_token("Token abc.def.ghi").unwrap(), "abc.def.ghi");
        assert_eq!(extract_token("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
        assert_eq!(extract_token("token  abc.def.ghi ").unwrap(), "abc.def.ghi");
    }

    #[test]
    fn extract_token_rejects_malformed_headers() {
        for header in ["abc.def.ghi", "Token", "Token ", "Basic dXNlcjpwYXNz", "Token a b"] {
            let err = extract_token(header).unwrap_err();
            assert!(
                matches!(err, ApiError::Unauthorized(_)),
                "{header:?} should be rejected"
            );
        }
    }

    #[test]
    fn issued_tokens_verify_to_the_same_user() {
        let jwt = JwtState::new(b"test-secret-key", Duration::hours(1));
        let user_id = Uuid::new_v4();

        let token = jwt.issue(user_id).unwrap();

        assert_eq!(jwt.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let ours = JwtState::new(b"test-secret-key", Duration::hours(1));
        let theirs = JwtState::new(b"wrong-secret-key", Duration::hours(1));

        let token = theirs.issue(Uuid::new_v4()).unwrap();

        assert!(matches!(
            ours.verify(&token),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let jwt = JwtState::new(b"test-secret-key", Duration::seconds(-120));

        let token = jwt.issue(Uuid::new_v4()).unwrap();

        assert!(matches!(jwt.verify(&token), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn out_of_range_ttl_fails_to_issue() {
        let jwt = JwtState::new(b"test-secret-key", Duration::hours(100_000_000_000));

        assert!(matches!(
            jwt.issue(Uuid::new_v4()),
            Err(ApiError::Internal(_))
        ));
    }

    #[test]
    fn tokens_with_non_uuid_subject_are_rejected() {
        let secret = b"test-secret-key";
        let jwt = JwtState::new(secret, Duration::hours(1));
        let claims = JwtClaims::session("not-a-uuid".to_string(), Duration::hours(1)).unwrap();
        let token = JwtValidator::encode(secret, &claims).unwrap();

        assert!(matches!(jwt.verify(&token), Err(ApiError::Unauthorized(_))));
    }
}
