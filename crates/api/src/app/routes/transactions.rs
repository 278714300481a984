use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use zenit_core::{AccountId, CategoryId, DomainError, TransactionId};
use zenit_http::{ApiJson, ApiQuery, ApiResult, PrincipalContext, TenantContext};
use zenit_infra::financial_store::{
    FinancialTransaction, NewTransaction, TransactionDetail, TransactionFilter, TransactionListItem,
    TransactionPatch,
};
use zenit_ledger::{TransactionStatus, TransactionType};

use crate::app::dto::{self, IdParam, CreateTransactionRequest, TransactionQuery, UpdateTransactionRequest};
use crate::app::FinancialServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route(
            "/:id",
            get(get_transaction).put(update_transaction).delete(delete_transaction),
        )
}

fn transaction_not_found() -> DomainError {
    DomainError::not_found("financial transaction not found")
}

pub async fn create_transaction(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateTransactionRequest>,
) -> ApiResult<Response> {
    let new = NewTransaction {
        account_id: body
            .account_id
            .ok_or_else(|| DomainError::validation("accountId is required"))?,
        category_id: body.category_id,
        description: dto::required("description", body.description)?,
        amount: body
            .amount
            .ok_or_else(|| DomainError::validation("amount is required"))?,
        date: dto::parse_date("date", &dto::required("date", body.date)?)?,
        transaction_type: dto::required("type", body.transaction_type)?.parse::<TransactionType>()?,
        status: dto::parse_opt::<TransactionStatus>(body.status)?.unwrap_or_default(),
        notes: dto::present(body.notes),
    };

    let transaction = services
        .store
        .create_transaction(tenant.company_id(), principal.user_id(), new)
        .await?;
    tracing::info!(
        company_id = %tenant.company_id(),
        transaction_id = %transaction.id,
        status = transaction.status.as_str(),
        "transaction created"
    );

    Ok((StatusCode::CREATED, Json(transaction)).into_response())
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    ApiQuery(query): ApiQuery<TransactionQuery>,
) -> ApiResult<Json<Vec<TransactionListItem>>> {
    let filter = TransactionFilter {
        start_date: dto::present(query.start_date)
            .map(|d| dto::parse_date("startDate", &d))
            .transpose()?,
        end_date: dto::present(query.end_date)
            .map(|d| dto::parse_end_date("endDate", &d))
            .transpose()?,
        account_id: dto::parse_opt::<AccountId>(query.account_id)?,
        category_id: dto::parse_opt::<CategoryId>(query.category_id)?,
        transaction_type: dto::parse_opt(query.transaction_type)?,
        status: dto::parse_opt(query.status)?,
    };
    Ok(Json(
        services.store.list_transactions(tenant.company_id(), filter).await?,
    ))
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
) -> ApiResult<Json<TransactionDetail>> {
    let id: TransactionId = id.parse()?;
    let transaction = services
        .store
        .get_transaction(tenant.company_id(), id)
        .await?
        .ok_or_else(transaction_not_found)?;
    Ok(Json(transaction))
}

pub async fn update_transaction(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
    ApiJson(body): ApiJson<UpdateTransactionRequest>,
) -> ApiResult<Json<FinancialTransaction>> {
    let id: TransactionId = id.parse()?;
    let patch = TransactionPatch {
        account_id: body.account_id,
        category_id: body.category_id,
        description: dto::non_empty("description", body.description)?,
        amount: body.amount,
        date: dto::present(body.date)
            .map(|d| dto::parse_date("date", &d))
            .transpose()?,
        transaction_type: dto::parse_opt(body.transaction_type)?,
        status: dto::parse_opt(body.status)?,
        notes: body.notes.map(dto::present),
    };
    if patch == TransactionPatch::default() {
        return Err(DomainError::validation("no fields to update").into());
    }

    let transaction = services
        .store
        .update_transaction(tenant.company_id(), id, patch)
        .await?
        .ok_or_else(transaction_not_found)?;
    tracing::info!(
        company_id = %tenant.company_id(),
        transaction_id = %transaction.id,
        status = transaction.status.as_str(),
        "transaction updated"
    );
    Ok(Json(transaction))
}

pub async fn delete_transaction(
    Extension(services): Extension<Arc<FinancialServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(IdParam { id }): Path<IdParam>,
) -> ApiResult<StatusCode> {
    let id: TransactionId = id.parse()?;
    if !services.store.delete_transaction(tenant.company_id(), id).await? {
        return Err(transaction_not_found().into());
    }
    tracing::info!(company_id = %tenant.company_id(), transaction_id = %id, "transaction deleted");
    Ok(StatusCode::NO_CONTENT)
}
