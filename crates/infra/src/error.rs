//! Storage error model.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Referential` |
//! | Database (check constraint violation) | `23514` | `Validation` |
//! | Database (other) | Any other | `Internal` |
//! | PoolClosed / RowNotFound / Other | N/A | `Internal` |

use thiserror::Error;

use zenit_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Input rejected by the store (e.g. a cross-company reference).
    #[error("{0}")]
    Validation(String),

    /// Unique field already taken.
    #[error("{0}")]
    Conflict(String),

    /// Delete blocked by dependent rows.
    #[error("{0}")]
    Referential(String),

    #[error("storage error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn referential(msg: impl Into<String>) -> Self {
        Self::Referential(msg.into())
    }

    pub(crate) fn poisoned() -> Self {
        Self::Internal("in-memory store lock poisoned".to_string())
    }
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(msg) => DomainError::validation(msg),
            StoreError::Conflict(msg) => DomainError::conflict(msg),
            StoreError::Referential(msg) => DomainError::referential(msg),
            StoreError::Internal(msg) => DomainError::internal(msg),
        }
    }
}

/// Map a sqlx error raised while running `operation` to a [`StoreError`].
///
/// `conflict` is the client-facing message used for unique violations.
pub(crate) fn map_sqlx_error(operation: &str, conflict: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::Conflict(conflict.to_string()),
            Some("23503") => StoreError::Referential(format!(
                "{operation}: referenced row missing or still in use"
            )),
            Some("23514") => StoreError::Validation(format!("{operation}: {}", db_err.message())),
            _ => StoreError::Internal(format!(
                "database error in {operation}: {}",
                db_err.message()
            )),
        },
        sqlx::Error::PoolClosed => {
            StoreError::Internal(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Internal(format!("sqlx error in {operation}: {err}")),
    }
}
