use axum::{extract::Extension, Json};
use serde_json::{Value, json};

use zenit_http::{PrincipalContext, TenantContext};

pub async fn me(
    Extension(principal): Extension<PrincipalContext>,
    Extension(tenant): Extension<TenantContext>,
) -> Json<Value> {
    Json(json!({
        "message": "authenticated",
        "user": principal.identity(),
        "companyId": tenant.company_id(),
    }))
}
