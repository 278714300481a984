//! Postgres connection pool lifecycle and schema bootstrap.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;

use crate::error::{StoreError, map_sqlx_error};

/// Schema scripts, applied in order. Every statement is idempotent.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Schema {
    Core,
    Financial,
}

impl Schema {
    fn sql(self) -> &'static str {
        match self {
            Schema::Core => include_str!("../migrations/core.sql"),
            Schema::Financial => include_str!("../migrations/financial.sql"),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Schema::Core => "core",
            Schema::Financial => "financial",
        }
    }
}

/// The process-wide database handle.
///
/// Created once at start-up and closed once on shutdown; stores receive a
/// clone of the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[instrument(skip(database_url), err)]
    pub async fn init(
        database_url: &str,
        max_connections: u32,
        schemas: &[Schema],
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", "", e))?;

        for schema in schemas {
            sqlx::raw_sql(schema.sql())
                .execute(&pool)
                .await
                .map_err(|e| map_sqlx_error(schema.name(), "", e))?;
            tracing::info!(schema = schema.name(), "schema ready");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
        tracing::info!("database pool closed");
    }
}
