use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use zenit_core::{AccountId, DomainError};
use zenit_http::{ApiJson, ApiResult, PrincipalContext, TenantContext};
use zenit_infra::financial_store::{AccountPatch, FinancialAccount, NewAccount};

use crate::app::dto::{self, IdParam, CreateAccountRequest, UpdateAccountRequest};
use crate::app::FinancialServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route("/:id", get(get_account).put(update_account).delete(delete_account))
}

fn account_not_found() -> DomainError {
    DomainError::not_found("financial account not found")
}

pub async fn create_account(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateAccountRequest>,
) -> ApiResult<Response> {
    let new = NewAccount {
        name: dto::required("name", body.name)?,
        account_type: dto::required("type", body.account_type)?,
        balance: body
            .balance
            .ok_or_else(|| DomainError::validation("balance is required"))?,
        account_number: dto::present(body.account_number),
        bank_name: dto::present(body.bank_name),
        is_active: body.is_active.unwrap_or(true),
    };

    let account = services
        .store
        .create_account(tenant.company_id(), principal.user_id(), new)
        .await?;
    tracing::info!(company_id = %tenant.company_id(), account_id = %account.id, "account created");

    Ok((StatusCode::CREATED, Json(account)).into_response())
}

pub async fn list_accounts(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Json<Vec<FinancialAccount>>> {
    Ok(Json(services.store.list_accounts(tenant.company_id()).await?))
}

pub async fn get_account(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
) -> ApiResult<Json<FinancialAccount>> {
    let id: AccountId = id.parse()?;
    let account = services
        .store
        .get_account(tenant.company_id(), id)
        .await?
        .ok_or_else(account_not_found)?;
    Ok(Json(account))
}

pub async fn update_account(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
    ApiJson(body): ApiJson<UpdateAccountRequest>,
) -> ApiResult<Json<FinancialAccount>> {
    let id: AccountId = id.parse()?;
    if body.balance.is_some() {
        return Err(DomainError::validation(
            "balance cannot be changed directly; record a transaction instead",
        )
        .into());
    }

    let patch = AccountPatch {
        name: dto::non_empty("name", body.name)?,
        account_type: dto::non_empty("type", body.account_type)?,
        account_number: body.account_number.map(dto::present),
        bank_name: body.bank_name.map(dto::present),
        is_active: body.is_active,
    };
    if patch == AccountPatch::default() {
        return Err(DomainError::validation("no fields to update").into());
    }

    let account = services
        .store
        .update_account(tenant.company_id(), id, patch)
        .await?
        .ok_or_else(account_not_found)?;
    Ok(Json(account))
}

pub async fn delete_account(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
) -> ApiResult<StatusCode> {
    let id: AccountId = id.parse()?;
    if !services.store.delete_account(tenant.company_id(), id).await? {
        return Err(account_not_found().into());
    }
    tracing::info!(company_id = %tenant.company_id(), account_id = %id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn opening_balance_is_kept_verbatim_in_request() {
        let body: CreateAccountRequest =
            serde_json::from_str(r#"{"name": "Cash", "type": "wallet", "balance": -12.5}"#).unwrap();
        assert_eq!(body.balance, Some(Decimal::new(-125, 1)));
    }
}
