//! JWT (JSON Web Token) session tokens

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Issuer stamped into every session token
pub const TOKEN_ISSUER: &str = "conduit";

/// JWT claims identifying an authenticated user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl JwtClaims {
    /// Fails if `validity` pushes the expiration outside the representable range
    pub fn new(user_id: String, issuer: String, validity: Duration) -> Result<Self, JwtError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(validity)
            .ok_or(JwtError::InvalidValidity)?;

        Ok(Self {
            sub: user_id,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: issuer,
        })
    }

    /// Claims for a session token issued by this service
    pub fn session(user_id: String, validity: Duration) -> Result<Self, JwtError> {
        Self::new(user_id, TOKEN_ISSUER.to_string(), validity)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// JWT errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Token validity is out of range")]
    InvalidValidity,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Validates HMAC-SHA256 signed session tokens
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Create a validator for tokens signed with `secret`
    ///
    /// Checks the signature and expiration only; call [`JwtValidator::with_issuer`]
    /// to also pin the issuer.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.validate_nbf = false;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, JwtError> {
        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                _ => JwtError::InvalidToken(e.to_string()),
            })?;

        // jsonwebtoken allows a leeway on `exp`; sessions end exactly at expiry
        if token_data.claims.is_expired() {
            return Err(JwtError::TokenExpired);
        }

        Ok(token_data.claims)
    }

    /// Encode JWT using HMAC-SHA256 (symmetric secret)
    pub fn encode(secret: &[u8], claims: &JwtClaims) -> Result<String, JwtError> {
        let header = Header::new(Algorithm::HS256);
        let encoding_key = EncodingKey::from_secret(secret);

        Ok(encode(&header, claims, &encoding_key)?)
    }
}
