//! Token verification against the identity service (`GET /auth/verify`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use zenit_auth::{Identity, IdentityVerifier};

/// Asks the identity service whether a bearer token is good.
///
/// No caching: every call is a round trip, and every failure is a rejection.
#[derive(Debug, Clone)]
pub struct RemoteIdentityVerifier {
    client: Client,
    verify_url: String,
}

impl RemoteIdentityVerifier {
    /// `core_api_url` is the identity service's `/api` base, e.g.
    /// `http://localhost:3000/api`.
    pub fn new(core_api_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            verify_url: format!("{}/auth/verify", core_api_url.trim_end_matches('/')),
        })
    }

    pub fn verify_url(&self) -> &str {
        &self.verify_url
    }
}

#[async_trait]
impl IdentityVerifier for RemoteIdentityVerifier {
    async fn verify(&self, bearer_token: &str) -> Option<Identity> {
        let response = match self
            .client
            .get(&self.verify_url)
            .bearer_auth(bearer_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, url = %self.verify_url, "token verification request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "identity service rejected token");
            return None;
        }

        match response.json::<Identity>().await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "malformed verify payload");
                None
            }
        }
    }
}
