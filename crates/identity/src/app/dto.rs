use serde::Deserialize;

use zenit_auth::Role;
use zenit_core::{CompanyId, DomainError, DomainResult};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    /// `null` clears the address; absent leaves it alone.
    #[serde(default, deserialize_with = "zenit_http::validate::double_option")]
    pub address: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    #[serde(default)]
    pub company_ids: Vec<CompanyId>,
    pub default_company_id: Option<CompanyId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub company_ids: Option<Vec<CompanyId>>,
    pub default_company_id: Option<CompanyId>,
}

// -------------------------
// Validation helpers
// -------------------------

pub use zenit_http::validate::{non_empty, required};

pub fn email(value: String) -> DomainResult<String> {
    let value = value.trim().to_string();
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(value),
        _ => Err(DomainError::validation("invalid email")),
    }
}
