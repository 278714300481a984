//! HS256 token issuing and verification (identity service only).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::claims::{TokenClaims, validate_claims};
use crate::{AuthError, Identity};

/// Signs and verifies bearer tokens carrying an [`Identity`].
///
/// The secret never leaves the identity service; other services verify a
/// token by calling `GET /api/auth/verify`.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = TokenClaims::for_identity(identity, now, now + self.ttl);
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))
    }

    /// Check signature, then the time window against `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        validate_claims(&data.claims, now).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims.into_identity())
    }
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}
