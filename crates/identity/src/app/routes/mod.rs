use zenit_auth::{AuthError, password};
use zenit_core::DomainError;
use zenit_http::ApiResult;

pub mod auth;
pub mod companies;
pub mod users;

// Argon2 is deliberately slow; keep it off the async workers.

pub(crate) async fn hash_password(plain: String) -> ApiResult<String> {
    let hashed = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| DomainError::internal(format!("hashing task failed: {e}")))??;
    Ok(hashed)
}

pub(crate) async fn verify_password(plain: String, hash: Option<String>) -> Result<(), AuthError> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => password::verify_password(&plain, &hash),
        None => Err(password::verify_against_dummy(&plain)),
    })
    .await
    .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))?
}
