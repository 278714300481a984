//! Configuration loading from the process environment.
//!
//! Both services read their settings once at start-up. Lookups go through a
//! closure so tests can feed a fixed map instead of mutating the environment.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be set when {reason}")]
    Missing { name: &'static str, reason: &'static str },

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Where the stores live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub root_company_name: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub store: StoreConfig,
    pub bootstrap: Option<BootstrapAdmin>,
}

impl core::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_ttl", &self.jwt_ttl)
            .field("store", &self.store)
            .field("bootstrap", &self.bootstrap.as_ref().map(|b| &b.email))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinancialConfig {
    pub bind_addr: SocketAddr,
    /// Base URL of the identity API, e.g. `http://localhost:3000/api`.
    pub core_api_url: String,
    pub verify_timeout: Duration,
    pub store: StoreConfig,
}

pub const DEFAULT_JWT_SECRET: &str = "dev-secret";

impl IdentityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_or(&lookup, "BIND_ADDR", "0.0.0.0:3000")?;

        let jwt_secret = lookup("JWT_SECRET").filter(|s| !s.is_empty()).unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEFAULT_JWT_SECRET.to_string()
        });

        let ttl_secs: u64 = parse_or(&lookup, "JWT_TTL_SECONDS", "86400")?;
        if ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_TTL_SECONDS",
                value: "0".to_string(),
            });
        }

        let bootstrap = match (
            non_empty(&lookup, "BOOTSTRAP_ADMIN_EMAIL"),
            non_empty(&lookup, "BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                email,
                password,
                root_company_name: non_empty(&lookup, "BOOTSTRAP_ROOT_COMPANY")
                    .unwrap_or_else(|| "Root".to_string()),
            }),
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    name: "BOOTSTRAP_ADMIN_PASSWORD",
                    reason: "BOOTSTRAP_ADMIN_EMAIL is set",
                });
            }
            _ => None,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            jwt_ttl: Duration::from_secs(ttl_secs),
            store: StoreConfig::from_lookup(&lookup)?,
            bootstrap,
        })
    }
}

impl FinancialConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let core_api_url = non_empty(&lookup, "CORE_API_URL")
            .unwrap_or_else(|| "http://localhost:3000/api".to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout_ms: u64 = parse_or(&lookup, "CORE_VERIFY_TIMEOUT_MS", "5000")?;

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", "0.0.0.0:3010")?,
            core_api_url,
            verify_timeout: Duration::from_millis(timeout_ms),
            store: StoreConfig::from_lookup(&lookup)?,
        })
    }
}

impl StoreConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let use_persistent = lookup("USE_PERSISTENT_STORES")
            .and_then(|v| v.trim().parse::<bool>().ok())
            .unwrap_or(false);

        if !use_persistent {
            return Ok(Self::InMemory);
        }

        let database_url = non_empty(lookup, "DATABASE_URL").ok_or(ConfigError::Missing {
            name: "DATABASE_URL",
            reason: "USE_PERSISTENT_STORES=true",
        })?;

        Ok(Self::Postgres {
            database_url,
            max_connections: parse_or(lookup, "DATABASE_MAX_CONNECTIONS", "10")?,
        })
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
{
    let raw = non_empty(lookup, name).unwrap_or_else(|| default.to_string());
    raw.parse::<T>()
        .map_err(|_| ConfigError::Invalid { name, value: raw })
}
