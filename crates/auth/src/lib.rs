//! `zenit-auth`: credentials, tokens and the authorization rules.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod identity;
pub mod password;
pub mod roles;
pub mod token;
pub mod verifier;

pub use authorize::{
    AuthzError, Grant, Operation, TargetUser, UserChanges, UserScope, authorize_company,
    authorize_user_create, authorize_user_delete, authorize_user_read, authorize_user_update,
    capability, max_assignable_role, user_list_scope,
};
pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use error::AuthError;
pub use identity::{Identity, has_access};
pub use roles::Role;
pub use token::TokenIssuer;
pub use verifier::IdentityVerifier;
