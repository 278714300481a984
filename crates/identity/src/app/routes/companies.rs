use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use zenit_auth::{Operation, authorize_company};
use zenit_core::{CompanyId, DomainError};
use zenit_http::{ApiJson, ApiResult, PrincipalContext};
use zenit_infra::identity_store::{Company, CompanyPatch, NewCompany};

use crate::app::dto::{self, CreateCompanyRequest, UpdateCompanyRequest};
use crate::app::IdentityServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_companies).post(create_company))
        .route("/:id", get(get_company).put(update_company).delete(delete_company))
}

fn company_not_found() -> DomainError {
    DomainError::not_found("company not found")
}

pub async fn create_company(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateCompanyRequest>,
) -> ApiResult<Response> {
    authorize_company(principal.identity(), Operation::CreateCompany)?;

    let new = NewCompany {
        name: dto::required("name", body.name)?,
        address: body.address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
    };
    let company = services.store.create_company(new).await?;
    tracing::info!(company_id = %company.id, code = company.code, "company created");

    Ok((StatusCode::CREATED, Json(company)).into_response())
}

pub async fn list_companies(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<Vec<Company>>> {
    authorize_company(principal.identity(), Operation::ReadCompany)?;
    Ok(Json(services.store.list_companies().await?))
}

pub async fn get_company(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Company>> {
    authorize_company(principal.identity(), Operation::ReadCompany)?;
    let id: CompanyId = id.parse()?;

    let company = services.store.get_company(id).await?.ok_or_else(company_not_found)?;
    Ok(Json(company))
}

pub async fn update_company(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateCompanyRequest>,
) -> ApiResult<Json<Company>> {
    authorize_company(principal.identity(), Operation::UpdateCompany)?;
    let id: CompanyId = id.parse()?;

    let patch = CompanyPatch {
        name: dto::non_empty("name", body.name)?,
        address: body.address,
    };
    let company = services
        .store
        .update_company(id, patch)
        .await?
        .ok_or_else(company_not_found)?;
    Ok(Json(company))
}

pub async fn delete_company(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    authorize_company(principal.identity(), Operation::DeleteCompany)?;
    let id: CompanyId = id.parse()?;

    if !services.store.delete_company(id).await? {
        return Err(company_not_found().into());
    }
    tracing::info!(company_id = %id, "company deleted");
    Ok(StatusCode::NO_CONTENT)
}
