//! Request field helpers shared by both services' DTOs.

use serde::{Deserialize, Deserializer};

use zenit_core::{DomainError, DomainResult};

/// For `Option<Option<T>>` fields: absent stays `None`, `null` becomes
/// `Some(None)`. Pair with `#[serde(default)]`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trimmed, non-empty text.
pub fn required(field: &str, value: Option<String>) -> DomainResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DomainError::validation(format!("{field} is required"))),
    }
}

/// Same as [`required`], for fields that may be omitted from an update.
pub fn non_empty(field: &str, value: Option<String>) -> DomainResult<Option<String>> {
    value.map(|v| required(field, Some(v))).transpose()
}
