use axum::{Router, routing::get};

pub mod accounts;
pub mod categories;
pub mod system;
pub mod transactions;

/// The tenant-scoped resource routers.
///
/// Mounted at `/api` and again at `/api/companies/:companyId`.
pub fn resources() -> Router {
    Router::new()
        .nest("/financial-accounts", accounts::router())
        .nest("/financial-categories", categories::router())
        .nest("/financial-transactions", transactions::router())
}

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/me", get(system::me))
        .merge(resources())
        .nest("/companies/:companyId", resources())
}
