/// Password hashing and verification using Argon2id
use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHash, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString},
};

use crate::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password using Argon2id.
/// Returns a PHC string suitable for storage in the database.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    validate_password(password)?;

    let salt = SaltString::generate(rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AuthError::Internal("failed to hash password".to_string()))
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|_| AuthError::Internal("invalid password hash format".to_string()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Burn the same work as a real verification, for unknown emails.
///
/// Always returns `InvalidCredentials`.
pub fn verify_against_dummy(password: &str) -> AuthError {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY.get_or_init(|| hash_password("dummy-password-for-timing").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
    AuthError::InvalidCredentials
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}
