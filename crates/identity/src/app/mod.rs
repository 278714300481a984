//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and token issuer
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request bodies

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod routes;
pub mod services;

pub use services::IdentityServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<IdentityServices>) -> Router {
    let auth_state = middleware::AuthState {
        tokens: services.tokens.clone(),
    };

    // Protected routes: require a valid bearer token.
    let protected = Router::new()
        .nest("/companies", routes::companies::router())
        .nest("/users", routes::users::router())
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .nest("/auth", routes::auth::router())
        .merge(protected);

    Router::new()
        .route("/health", get(zenit_http::health))
        .nest("/api", api)
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(zenit_http::trace_layer()))
}
