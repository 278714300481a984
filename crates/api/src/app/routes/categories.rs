use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use zenit_core::{CategoryId, DomainError};
use zenit_http::{ApiJson, ApiQuery, ApiResult, TenantContext};
use zenit_infra::financial_store::{CategoryFilter, CategoryPatch, FinancialCategory, NewCategory};
use zenit_ledger::CategoryType;

use crate::app::dto::{self, IdParam, CategoryQuery, CreateCategoryRequest, UpdateCategoryRequest};
use crate::app::FinancialServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", get(get_category).put(update_category).delete(delete_category))
}

fn category_not_found() -> DomainError {
    DomainError::not_found("financial category not found")
}

pub async fn create_category(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    ApiJson(body): ApiJson<CreateCategoryRequest>,
) -> ApiResult<Response> {
    let name = dto::required("name", body.name)?;
    let category_type: CategoryType = dto::required("type", body.category_type)?.parse()?;

    let category = services
        .store
        .create_category(
            tenant.company_id(),
            NewCategory {
                name,
                category_type,
                color: dto::present(body.color),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(category)).into_response())
}

pub async fn list_categories(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    ApiQuery(query): ApiQuery<CategoryQuery>,
) -> ApiResult<Json<Vec<FinancialCategory>>> {
    let filter = CategoryFilter {
        category_type: dto::parse_opt(query.category_type)?,
    };
    Ok(Json(services.store.list_categories(tenant.company_id(), filter).await?))
}

pub async fn get_category(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
) -> ApiResult<Json<FinancialCategory>> {
    let id: CategoryId = id.parse()?;
    let category = services
        .store
        .get_category(tenant.company_id(), id)
        .await?
        .ok_or_else(category_not_found)?;
    Ok(Json(category))
}

pub async fn update_category(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
    ApiJson(body): ApiJson<UpdateCategoryRequest>,
) -> ApiResult<Json<FinancialCategory>> {
    let id: CategoryId = id.parse()?;
    let patch = CategoryPatch {
        name: dto::non_empty("name", body.name)?,
        category_type: dto::parse_opt(body.category_type)?,
        color: dto::present(body.color),
    };
    if patch == CategoryPatch::default() {
        return Err(DomainError::validation("no fields to update").into());
    }

    let category = services
        .store
        .update_category(tenant.company_id(), id, patch)
        .await?
        .ok_or_else(category_not_found)?;
    Ok(Json(category))
}

pub async fn delete_category(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
) -> ApiResult<StatusCode> {
    let id: CategoryId = id.parse()?;
    if !services.store.delete_category(tenant.company_id(), id).await? {
        return Err(category_not_found().into());
    }
    Ok(StatusCode::NO_CONTENT)
}
