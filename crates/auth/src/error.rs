use thiserror::Error;

use zenit_core::DomainError;

/// Errors raised by the credential and token primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown email or wrong password (deliberately indistinguishable).
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("password must be at least {} characters", crate::password::MIN_PASSWORD_LEN)]
    WeakPassword,

    #[error("{0}")]
    Internal(String),
}

impl From<AuthError> for DomainError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => DomainError::unauthenticated("invalid credentials"),
            AuthError::InvalidToken(_) => DomainError::unauthenticated("invalid token"),
            AuthError::WeakPassword => DomainError::validation(value.to_string()),
            AuthError::Internal(msg) => DomainError::internal(msg),
        }
    }
}
