//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and the identity client
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request bodies, query strings and their parsing

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod routes;
pub mod services;

pub use services::FinancialServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<FinancialServices>) -> Router {
    let auth_state = middleware::AuthState {
        verifier: services.verifier.clone(),
    };

    // Protected routes: auth runs first (outermost), then tenant resolution.
    let protected = routes::router()
        .layer(axum::middleware::from_fn(middleware::tenant_middleware))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .route("/health", get(zenit_http::health))
        .merge(protected);

    Router::new()
        .nest("/api", api)
        .layer(Extension(services))
        .layer(ServiceBuilder::new().layer(zenit_http::trace_layer()))
}
