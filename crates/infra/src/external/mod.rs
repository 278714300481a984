//! Clients for services owned by someone else.

mod core_identity;

pub use core_identity::RemoteIdentityVerifier;
