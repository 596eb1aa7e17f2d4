//! Credentials for the Conduit backend: session tokens and password hashing

pub mod jwt;
pub mod password;

pub use jwt::{JwtClaims, JwtError, JwtValidator, TOKEN_ISSUER};
pub use password::{
    check_password_policy, hash_password, verify_password, PasswordError, MAX_PASSWORD_LENGTH,
    MIN_PASSWORD_LENGTH,
};
