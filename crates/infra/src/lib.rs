//! Infrastructure layer: config, Postgres, stores, external service clients.

pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod financial_store;
pub mod identity_store;

pub use error::{StoreError, StoreResult};
