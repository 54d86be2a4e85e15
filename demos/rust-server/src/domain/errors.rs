//! Domain errors - Business rule violations.

use arbor_runtime::ResolverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Author not found: {0}")]
    AuthorNotFound(String),

    #[error("{message}")]
    Validation { field: String, message: String },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<DomainError> for ResolverError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::AuthorNotFound(_) => ResolverError::NotFound(error.to_string()),
            DomainError::Validation { field, message } => ResolverError::user_input(field, message),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
