use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use zenit_auth::TokenIssuer;
use zenit_http::{ApiError, PrincipalContext, extract_bearer};

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenIssuer>,
}

/// Verify the bearer token locally and attach the caller's identity.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;
    let identity = state.tokens.verify(token, Utc::now())?;

    req.extensions_mut().insert(PrincipalContext::new(identity));
    Ok(next.run(req).await)
}
