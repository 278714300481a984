use async_trait::async_trait;

use crate::Identity;

/// Turns a bearer token into a verified identity.
///
/// Implementations must fail closed: any doubt about the token (transport
/// failure, timeout, bad status, malformed payload) is `None`.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Option<Identity>;
}
