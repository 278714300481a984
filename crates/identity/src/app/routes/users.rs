use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use zenit_auth::{
    Role, UserChanges, UserScope, authorize_user_create, authorize_user_delete,
    authorize_user_read, authorize_user_update, user_list_scope,
};
use zenit_core::{CompanyId, DomainError, UserId};
use zenit_http::{ApiJson, ApiResult, PrincipalContext};
use zenit_infra::identity_store::{IdentityStore, NewUser, User, UserFilter, UserPatch};

use crate::app::dto::{self, CreateUserRequest, UpdateUserRequest};
use crate::app::IdentityServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
}

fn user_not_found() -> DomainError {
    DomainError::not_found("user not found")
}

async fn root_company_id(store: &dyn IdentityStore) -> ApiResult<Option<CompanyId>> {
    Ok(store.root_company().await?.map(|c| c.id))
}

pub async fn create_user(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> ApiResult<Response> {
    let role = body.role.unwrap_or(Role::User);
    let root = root_company_id(services.store.as_ref()).await?;
    authorize_user_create(principal.identity(), role, &body.company_ids, root)?;

    let email = dto::email(dto::required("email", body.email)?)?;
    let name = dto::required("name", body.name)?;
    let password = body
        .password
        .ok_or_else(|| DomainError::validation("password is required"))?;
    if body.company_ids.is_empty() {
        return Err(DomainError::validation("at least one companyId is required").into());
    }
    let password_hash = super::hash_password(password).await?;

    let user = services
        .store
        .create_user(NewUser {
            email,
            password_hash,
            name,
            role,
            company_ids: body.company_ids,
            default_company_id: body.default_company_id,
        })
        .await?;
    tracing::info!(
        user_id = %user.id,
        role = user.role.as_str(),
        created_by = %principal.user_id(),
        "user created"
    );

    Ok((StatusCode::CREATED, Json(user)).into_response())
}

pub async fn list_users(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<Json<Vec<User>>> {
    let filter = match user_list_scope(principal.identity())? {
        UserScope::All => UserFilter::All,
        UserScope::SharedCompanies(ids) => UserFilter::InCompanies(ids),
        UserScope::OnlySelf(id) => UserFilter::Only(id),
    };
    Ok(Json(services.store.list_users(filter).await?))
}

pub async fn get_user(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    let id: UserId = id.parse()?;
    let user = services.store.get_user(id).await?;

    authorize_user_read(principal.identity(), id, user.as_ref().map(User::as_target).as_ref())?;
    Ok(Json(user.ok_or_else(user_not_found)?))
}

pub async fn update_user(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    let id: UserId = id.parse()?;
    let current = services.store.get_user(id).await?;
    let root = root_company_id(services.store.as_ref()).await?;

    let changes = UserChanges {
        role: body.role,
        company_ids: body.company_ids.clone(),
        default_company_id: body.default_company_id,
    };
    authorize_user_update(
        principal.identity(),
        id,
        current.as_ref().map(User::as_target).as_ref(),
        &changes,
        root,
    )?;

    if body.company_ids.as_ref().is_some_and(|ids| ids.is_empty()) {
        return Err(DomainError::validation("at least one companyId is required").into());
    }
    let email = dto::non_empty("email", body.email)?.map(dto::email).transpose()?;
    let name = dto::non_empty("name", body.name)?;
    let password_hash = match body.password {
        Some(password) => Some(super::hash_password(password).await?),
        None => None,
    };

    let patch = UserPatch {
        email,
        password_hash,
        name,
        role: body.role,
        company_ids: body.company_ids,
        default_company_id: body.default_company_id,
    };
    let user = services
        .store
        .update_user(id, patch)
        .await?
        .ok_or_else(user_not_found)?;
    tracing::info!(user_id = %user.id, updated_by = %principal.user_id(), "user updated");
    Ok(Json(user))
}

pub async fn delete_user(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: UserId = id.parse()?;
    let current = services.store.get_user(id).await?;
    authorize_user_delete(principal.identity(), id, current.as_ref().map(User::as_target).as_ref())?;

    if !services.store.delete_user(id).await? {
        return Err(user_not_found().into());
    }
    tracing::info!(user_id = %id, deleted_by = %principal.user_id(), "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
