use std::borrow::Cow;

use crate::models::test_result::AttemptStatus;
use crate::utils::validation::{field_error, ENTITY};
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Invalid transition: cannot {action} an attempt that is {status}")]
    InvalidTransition {
        status: AttemptStatus,
        action: &'static str,
    },

    #[error("Delete restricted: {0}")]
    DeleteRestricted(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Single-rule validation failure on `field` (use [`ENTITY`] for whole-record rules).
    pub fn invalid(
        field: &'static str,
        code: &'static str,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, field_error(code, message));
        Error::Validation(errors)
    }

    pub fn taken(field: &'static str) -> Self {
        Self::invalid(field, "unique", "has already been taken")
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{} {} not found", entity, id))
    }

    /// True when this is a validation failure that names `field`.
    pub fn is_invalid(&self, field: &str) -> bool {
        match self {
            Error::Validation(errors) => errors.errors().contains_key(field),
            _ => false,
        }
    }

    pub fn is_entity_invalid(&self) -> bool {
        self.is_invalid(ENTITY)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::taken(constraint_field(db.constraint()))
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => Error::NotFound(format!(
                "Referenced record does not exist ({})",
                db.constraint().unwrap_or("foreign key")
            )),
            other => Error::Database(other),
        }
    }
}

/// Maps a unique constraint from `migrations/` back to the field it guards.
fn constraint_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("categories_title_key") | Some("tests_category_id_title_key") => "title",
        Some("questions_test_id_position_key") => "position",
        Some("users_email_key") => "email",
        Some("test_result_answers_pkey") => "question_id",
        _ => ENTITY,
    }
}
