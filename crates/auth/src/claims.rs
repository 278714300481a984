use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zenit_core::{CompanyId, UserId};

use crate::{Identity, Role};

/// JWT claims issued by the identity service.
///
/// Timestamps are Unix seconds (`iat`/`exp` as registered JWT claims).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub user_id: UserId,
    pub role: Role,
    pub company_ids: Vec<CompanyId>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn for_identity(identity: &Identity, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id: identity.user_id,
            role: identity.role,
            company_ids: identity.company_ids.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    pub fn into_identity(self) -> Identity {
        Identity::new(self.user_id, self.role, self.company_ids)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of decoded claims.
///
/// Signature verification happens before this, in [`crate::TokenIssuer`].
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
