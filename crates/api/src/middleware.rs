use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{Method, header::CONTENT_TYPE},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use zenit_auth::IdentityVerifier;
use zenit_core::DomainError;
use zenit_http::{ApiError, PrincipalContext, TenantContext, extract_bearer};

use crate::tenant::{COMPANY_ID_FIELD, TenantSources, resolve_tenant};

/// Bodies larger than this are rejected before tenant resolution.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// Forward the bearer token to the identity service and attach the verified
/// identity. Fails closed.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;

    let identity = state
        .verifier
        .verify(token)
        .await
        .ok_or_else(|| DomainError::unauthenticated("invalid or expired token"))?;

    req.extensions_mut().insert(PrincipalContext::new(identity));
    Ok(next.run(req).await)
}

/// Resolve the company of the request and attach a [`TenantContext`].
///
/// Must run after [`auth_middleware`].
pub async fn tenant_middleware(
    params: Option<Path<HashMap<String, String>>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req
        .extensions()
        .get::<PrincipalContext>()
        .cloned()
        .ok_or_else(|| DomainError::unauthenticated("not authenticated"))?;

    let route = params.and_then(|Path(mut p)| p.remove(COMPANY_ID_FIELD));
    let query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(mut q)| q.remove(COMPANY_ID_FIELD));

    let (mut req, body) = buffer_json_body(req).await?;
    let body_company = body.as_ref().and_then(|b| b.get(COMPANY_ID_FIELD));

    let sources = TenantSources {
        route: route.as_deref(),
        body: body_company,
        query: query.as_deref(),
    };
    let company_id = resolve_tenant(principal.identity(), &sources).inspect_err(|e| {
        tracing::debug!(user_id = %principal.user_id(), error = %e, "tenant rejected");
    })?;

    req.extensions_mut().insert(TenantContext::new(company_id));
    Ok(next.run(req).await)
}

/// Read a JSON body so its `companyId` can be inspected, then put the bytes
/// back for the handler.
async fn buffer_json_body(req: Request) -> Result<(Request, Option<Value>), ApiError> {
    let has_body = !matches!(*req.method(), Method::GET | Method::HEAD | Method::DELETE);
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !has_body || !is_json {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| DomainError::validation("request body too large"))?;

    // Malformed JSON is left for the handler's extractor to reject.
    let parsed = serde_json::from_slice::<Value>(&bytes).ok();
    Ok((Request::from_parts(parts, Body::from(bytes)), parsed))
}
