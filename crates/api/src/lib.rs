//! Financial service: accounts, categories and transactions per company.
//!
//! Tokens are verified by the identity service; the company of each request
//! is resolved by [`tenant`] before any handler runs.

pub mod app;
pub mod middleware;
pub mod tenant;
