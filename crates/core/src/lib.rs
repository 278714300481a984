//! `zenit-core`: shared domain primitives for the identity and financial services.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, CategoryId, CompanyId, TransactionId, UserId};
