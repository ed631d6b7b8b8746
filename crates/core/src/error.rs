//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant maps onto exactly one HTTP status at the API boundary, so the
/// message carried here is what the caller sees.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("{0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Credentials or token were missing or rejected.
    #[error("{0}")]
    Authentication(String),

    /// The caller is known but not allowed to do this.
    #[error("{0}")]
    Authorization(String),

    /// A requested resource was not found (or is outside the caller's scope).
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or state conflict (duplicate name, role in use, ...).
    #[error("{0}")]
    Conflict(String),

    /// A dependency (organization service, blacklist store) failed or timed out.
    #[error("service communication failed: {0}")]
    ServiceCommunication(String),

    /// Unexpected failure; details are logged, never shown in production.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::ServiceCommunication(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidId(_) => "invalid_id",
            Self::Authentication(_) => "authentication_error",
            Self::Authorization(_) => "authorization_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ServiceCommunication(_) => "service_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_passed_through_verbatim() {
        let err = DomainError::validation("User and role must belong to the same organization");
        assert_eq!(
            err.to_string(),
            "User and role must belong to the same organization"
        );
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn dependency_failures_are_not_not_found() {
        let err = DomainError::service("organization service timed out");
        assert_eq!(err.code(), "service_unavailable");
        assert!(!matches!(err, DomainError::NotFound(_)));
    }
}
