use std::sync::Arc;

use anyhow::Context;

use zenit_auth::IdentityVerifier;
use zenit_infra::config::{FinancialConfig, StoreConfig};
use zenit_infra::db::{Database, Schema};
use zenit_infra::external::RemoteIdentityVerifier;
use zenit_infra::financial_store::{FinancialStore, InMemoryFinancialStore, PostgresFinancialStore};

/// Everything the financial handlers need, shared behind an `Arc`.
pub struct FinancialServices {
    pub store: Arc<dyn FinancialStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl FinancialServices {
    pub fn new(store: Arc<dyn FinancialStore>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { store, verifier }
    }

    /// In-memory store with the given verifier, for dev and tests.
    pub fn in_memory(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self::new(Arc::new(InMemoryFinancialStore::new()), verifier)
    }
}

/// Select the store and build the identity client from configuration.
pub async fn build_services(
    config: &FinancialConfig,
) -> anyhow::Result<(Arc<FinancialServices>, Option<Database>)> {
    let verifier = RemoteIdentityVerifier::new(&config.core_api_url, config.verify_timeout)
        .context("failed to build identity service client")?;
    tracing::info!(verify_url = verifier.verify_url(), "verifying tokens remotely");
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(verifier);

    match &config.store {
        StoreConfig::InMemory => {
            tracing::info!("using in-memory financial store");
            Ok((Arc::new(FinancialServices::in_memory(verifier)), None))
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            tracing::info!("using Postgres financial store");
            let db = Database::init(database_url, *max_connections, &[Schema::Financial])
                .await
                .context("failed to initialize database")?;
            let store: Arc<dyn FinancialStore> = Arc::new(PostgresFinancialStore::new(db.pool().clone()));
            Ok((Arc::new(FinancialServices::new(store, verifier)), Some(db)))
        }
    }
}
