//! Domain error model shared by both services.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Each variant corresponds to one class of client-visible failure. The HTTP
/// layer maps variants to status codes; nothing here knows about HTTP.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or unverifiable credentials.
    #[error("{0}")]
    Unauthenticated(String),

    /// Authenticated, but not allowed (privilege or tenant mismatch).
    #[error("{0}")]
    Forbidden(String),

    /// Resource does not exist (only used where existence may be disclosed).
    #[error("{0}")]
    NotFound(String),

    /// Unique field already taken.
    #[error("{0}")]
    Conflict(String),

    /// Delete blocked by dependent rows.
    #[error("{0}")]
    ReferentialIntegrity(String),

    /// Anything unexpected. The message is for logs, not for clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn referential(msg: impl Into<String>) -> Self {
        Self::ReferentialIntegrity(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-friendly name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ReferentialIntegrity(_) => "referential_integrity",
            Self::Internal(_) => "internal",
        }
    }
}
