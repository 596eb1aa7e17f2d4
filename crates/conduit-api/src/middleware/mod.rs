//! API Middleware
//!
//! Token authentication and the extractors handlers use to read its result.

pub mod auth;

pub use auth::{authenticate, extract_token, AuthUser, JwtState, MaybeAuthUser};
