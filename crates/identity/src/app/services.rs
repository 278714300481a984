use std::sync::Arc;

use anyhow::Context;

use zenit_auth::TokenIssuer;
use zenit_infra::config::{IdentityConfig, StoreConfig};
use zenit_infra::db::{Database, Schema};
use zenit_infra::identity_store::{IdentityStore, InMemoryIdentityStore, PostgresIdentityStore};

/// Everything the identity handlers need, shared behind an `Arc`.
pub struct IdentityServices {
    pub store: Arc<dyn IdentityStore>,
    pub tokens: Arc<TokenIssuer>,
}

impl IdentityServices {
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenIssuer) -> Self {
        Self {
            store,
            tokens: Arc::new(tokens),
        }
    }

    /// In-memory store, for dev and tests.
    pub fn in_memory(jwt_secret: &str, ttl: chrono::Duration) -> Self {
        Self::new(
            Arc::new(InMemoryIdentityStore::new()),
            TokenIssuer::new(jwt_secret.as_bytes(), ttl),
        )
    }
}

/// Select stores from configuration.
///
/// Returns the database handle too when Postgres is used, so `main` can
/// close the pool on shutdown.
pub async fn build_services(
    config: &IdentityConfig,
) -> anyhow::Result<(Arc<IdentityServices>, Option<Database>)> {
    let ttl = chrono::Duration::from_std(config.jwt_ttl).context("JWT_TTL_SECONDS out of range")?;
    let tokens = TokenIssuer::new(config.jwt_secret.as_bytes(), ttl);

    match &config.store {
        StoreConfig::InMemory => {
            tracing::info!("using in-memory identity store");
            let store: Arc<dyn IdentityStore> = Arc::new(InMemoryIdentityStore::new());
            Ok((Arc::new(IdentityServices::new(store, tokens)), None))
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            tracing::info!("using Postgres identity store");
            let db = Database::init(database_url, *max_connections, &[Schema::Core])
                .await
                .context("failed to initialize database")?;
            let store: Arc<dyn IdentityStore> = Arc::new(PostgresIdentityStore::new(db.pool().clone()));
            Ok((Arc::new(IdentityServices::new(store, tokens)), Some(db)))
        }
    }
}
