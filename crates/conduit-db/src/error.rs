//! Error taxonomy shared by every domain operation

use std::collections::BTreeMap;
use std::fmt;

use conduit_auth::PasswordError;
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Validation messages keyed by the offending field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field error, ready to return
    pub fn single(field: &str, message: impl Into<String>) -> StoreError {
        let mut errors = Self::new();
        errors.add(field, message);
        StoreError::Validation(errors)
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Record an error on `field` if `value` is longer than `max` characters
    pub fn check_max_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                field,
                format!("Ensure this field has no more than {} characters.", max),
            );
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.0
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }

    /// `Ok(())` when nothing was recorded
    pub fn into_result(self) -> StoreResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected; surfaced to the client field by field
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Credentials missing, wrong, or pointing at no account
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed to do this
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl StoreError {
    /// Map a unique-constraint violation that slipped past the pre-checks
    /// onto a field error; anything else stays a database error.
    pub(crate) fn from_unique_violation(err: DbErr, fields: &[(&str, &str)]) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            let detail = detail.to_lowercase();
            for &(field, message) in fields {
                if detail.contains(field) {
                    return FieldErrors::single(field, message);
                }
            }
            if let Some(&(field, message)) = fields.first() {
                return FieldErrors::single(field, message);
            }
        }
        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("email", "This field is required.");
        errors.add("password", "too short");
        errors.add("password", "too common");

        assert!(errors.contains("email"));
        assert_eq!(errors.fields()["password"].len(), 2);
        assert_eq!(
            errors.to_string(),
            "email: This field is required.; password: too short; password: too common"
        );
    }

    #[test]
    fn max_length_counts_characters() {
        let mut errors = FieldErrors::new();
        errors.check_max_length("bio", "ééé", 3);
        assert!(errors.is_empty());

        errors.check_max_length("bio", "éééé", 3);
        assert_eq!(
            errors.fields()["bio"],
            vec!["Ensure this field has no more than 3 characters.".to_string()]
        );
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn non_unique_db_errors_pass_through() {
        let err = StoreError::from_unique_violation(
            DbErr::Custom("boom".to_string()),
            &[("email", "taken")],
        );
        assert!(matches!(err, StoreError::Database(_)));
    }
}
