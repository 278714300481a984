//! Tenant resolution: which company a financial request operates on.
//!
//! Pure functions over already-extracted inputs; the middleware in
//! [`crate::middleware`] does the extraction.

use serde_json::Value;

use zenit_auth::{Identity, has_access};
use zenit_core::{CompanyId, DomainError, DomainResult};

pub const COMPANY_ID_FIELD: &str = "companyId";

/// Raw `companyId` candidates, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TenantSources<'a> {
    /// `:companyId` route parameter.
    pub route: Option<&'a str>,
    /// `companyId` field of a JSON body.
    pub body: Option<&'a Value>,
    /// `?companyId=` query parameter.
    pub query: Option<&'a str>,
}

fn invalid() -> DomainError {
    DomainError::validation("invalid companyId")
}

fn from_text(raw: &str) -> DomainResult<Option<CompanyId>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.parse::<CompanyId>().map(Some).map_err(|_| invalid())
}

fn from_json(raw: &Value) -> DomainResult<Option<CompanyId>> {
    match raw {
        Value::Null => Ok(None),
        Value::String(s) => from_text(s),
        Value::Number(n) => n.as_i64().map(|v| Some(CompanyId::new(v))).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

/// First present candidate: route, then body, then query, then the first
/// company of the token. Empty strings and `null` count as absent.
pub fn candidate(identity: &Identity, sources: &TenantSources<'_>) -> DomainResult<Option<CompanyId>> {
    if let Some(id) = sources.route.map(from_text).transpose()?.flatten() {
        return Ok(Some(id));
    }
    if let Some(id) = sources.body.map(from_json).transpose()?.flatten() {
        return Ok(Some(id));
    }
    if let Some(id) = sources.query.map(from_text).transpose()?.flatten() {
        return Ok(Some(id));
    }
    Ok(identity.first_company())
}

/// Resolve and authorize the tenant of a request.
pub fn resolve_tenant(identity: &Identity, sources: &TenantSources<'_>) -> DomainResult<CompanyId> {
    let company_id = candidate(identity, sources)?
        .ok_or_else(|| DomainError::forbidden("tenant not defined"))?;

    if !has_access(identity, company_id) {
        return Err(DomainError::forbidden(format!(
            "access denied to company {company_id}"
        )));
    }
    Ok(company_id)
}
