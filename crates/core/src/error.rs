//! Input-level error model.

use thiserror::Error;

/// Result type used for validation of inbound values.
pub type DomainResult<T> = Result<T, DomainError>;

/// Validation failure of a caller-supplied value.
///
/// These are always surfaced to the caller (400-class) and never retried.
/// Authentication and authorization failures have their own error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
