//! Users, companies and memberships (identity service storage).
//!
//! One trait, two implementations: [`InMemoryIdentityStore`] for dev/tests
//! and [`PostgresIdentityStore`] for production. Every mutating method is a
//! single unit of work.

mod memory;
mod postgres;

pub use memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;

use chrono::{DateTime, Utc};
use serde::Serialize;

use zenit_auth::{Role, TargetUser};
use zenit_core::{CompanyId, UserId};

use crate::error::StoreResult;

/// Code of the root company.
pub const ROOT_COMPANY_CODE: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub address: Option<String>,
    pub code: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub fn is_root(&self) -> bool {
        self.code == ROOT_COMPANY_CODE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub company_id: CompanyId,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub memberships: Vec<Membership>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Member companies, default first.
    pub fn company_ids(&self) -> Vec<CompanyId> {
        let mut ordered: Vec<&Membership> = self.memberships.iter().collect();
        ordered.sort_by_key(|m| (!m.is_default, m.company_id));
        ordered.into_iter().map(|m| m.company_id).collect()
    }

    pub fn default_company_id(&self) -> Option<CompanyId> {
        self.memberships
            .iter()
            .find(|m| m.is_default)
            .map(|m| m.company_id)
    }

    pub fn as_target(&self) -> TargetUser {
        TargetUser {
            id: self.id,
            role: self.role,
            company_ids: self.company_ids(),
            default_company_id: self.default_company_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompany {
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the address.
    pub address: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub company_ids: Vec<CompanyId>,
    /// Defaults to the first entry of `company_ids`.
    pub default_company_id: Option<CompanyId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    /// Full replacement of the membership list.
    pub company_ids: Option<Vec<CompanyId>>,
    pub default_company_id: Option<CompanyId>,
}

/// Which users a listing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    All,
    /// Users with at least one membership in any of these companies.
    InCompanies(Vec<CompanyId>),
    Only(UserId),
}

#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    async fn count_users(&self) -> StoreResult<u64>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Ordered by id.
    async fn list_users(&self, filter: UserFilter) -> StoreResult<Vec<User>>;

    /// Insert the user and its memberships. `Conflict` on a taken email,
    /// `Validation` on an unknown company.
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;

    async fn update_user(&self, id: UserId, patch: UserPatch) -> StoreResult<Option<User>>;

    /// Remove the user together with its own memberships.
    async fn delete_user(&self, id: UserId) -> StoreResult<bool>;

    /// Ordered by code.
    async fn list_companies(&self) -> StoreResult<Vec<Company>>;

    async fn get_company(&self, id: CompanyId) -> StoreResult<Option<Company>>;

    /// The company with code `0`, if one exists.
    async fn root_company(&self) -> StoreResult<Option<Company>>;

    /// Assigns the next code (`max + 1`, or `0` for the first company).
    async fn create_company(&self, new: NewCompany) -> StoreResult<Company>;

    async fn update_company(&self, id: CompanyId, patch: CompanyPatch) -> StoreResult<Option<Company>>;

    /// `Referential` while any membership or other record references the company.
    async fn delete_company(&self, id: CompanyId) -> StoreResult<bool>;
}

pub(crate) const EMAIL_TAKEN: &str = "email already in use";
pub(crate) const COMPANY_IN_USE: &str = "cannot delete company with linked users";
/// Rows outside the membership table (e.g. financial data) still point at the company.
pub(crate) const COMPANY_HAS_RECORDS: &str = "cannot delete company with linked records";

/// Resolve the default membership for a replacement list.
///
/// Order: the requested default, then the previous default if still present,
/// then the first company.
pub(crate) fn pick_default(
    company_ids: &[CompanyId],
    requested: Option<CompanyId>,
    previous: Option<CompanyId>,
) -> StoreResult<Option<CompanyId>> {
    if let Some(requested) = requested {
        if !company_ids.contains(&requested) {
            return Err(crate::StoreError::validation(
                "defaultCompanyId must be one of the user's companies",
            ));
        }
        return Ok(Some(requested));
    }
    Ok(previous
        .filter(|p| company_ids.contains(p))
        .or_else(|| company_ids.first().copied()))
}

pub(crate) fn dedup_companies(ids: &[CompanyId]) -> Vec<CompanyId> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}
