use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use zenit_auth::{AuthError, Identity};
use zenit_core::DomainError;
use zenit_http::{ApiJson, ApiResult, extract_bearer, json_error};

use crate::app::dto::LoginRequest;
use crate::app::IdentityServices;

pub const REGISTRATION_DISABLED: &str =
    "user registration is disabled; use POST /api/users with an authorized account";

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify", get(verify))
}

pub async fn register() -> Response {
    json_error(StatusCode::FORBIDDEN, REGISTRATION_DISABLED)
}

pub async fn login(
    Extension(services): Extension<Arc<IdentityServices>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let (email, password) = match (body.email, body.password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return Err(DomainError::validation("email and password are required").into()),
    };

    let user = services.store.find_user_by_email(&email).await?;
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());

    if let Err(e) = super::verify_password(password, stored_hash).await {
        if let AuthError::Internal(detail) = &e {
            tracing::error!(error = %detail, "password verification failed");
        }
        return Err(AuthError::InvalidCredentials.into());
    }
    let Some(user) = user else {
        return Err(AuthError::InvalidCredentials.into());
    };

    let identity = Identity::new(user.id, user.role, user.company_ids());
    let token = services.tokens.issue(&identity, Utc::now())?;
    tracing::info!(user_id = %user.id, "login succeeded");

    Ok((
        StatusCode::OK,
        Json(json!({ "token": token, "message": "login successful" })),
    )
        .into_response())
}

/// Used by the financial service to validate tokens it cannot verify itself.
pub async fn verify(
    Extension(services): Extension<Arc<IdentityServices>>,
    headers: HeaderMap,
) -> ApiResult<Json<Identity>> {
    let token = extract_bearer(&headers)?;
    let identity = services.tokens.verify(token, Utc::now())?;
    Ok(Json(identity))
}
