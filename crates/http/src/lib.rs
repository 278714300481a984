//! HTTP plumbing shared by both services: error rendering, extractors,
//! bearer parsing, request context types and DTO field helpers.

pub mod context;
pub mod error;
pub mod extract;
pub mod validate;

pub use context::{PrincipalContext, TenantContext};
pub use error::{ApiError, ApiResult, json_error};
pub use extract::{ApiJson, ApiQuery, extract_bearer};

use axum::Json;
use serde_json::{Value, json};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Liveness probe body shared by both services.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Request/response spans at `info`.
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}

/// Resolves on SIGINT or SIGTERM; for `axum::serve(..).with_graceful_shutdown`.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
