use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use zenit_core::{CompanyId, UserId};

use super::{
    COMPANY_IN_USE, Company, CompanyPatch, EMAIL_TAKEN, IdentityStore, Membership, NewCompany,
    NewUser, ROOT_COMPANY_CODE, User, UserFilter, UserPatch, dedup_companies, pick_default,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, User>,
    companies: BTreeMap<CompanyId, Company>,
    next_user_id: i64,
    next_company_id: i64,
}

impl State {
    fn email_taken(&self, email: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn ensure_companies_exist(&self, ids: &[CompanyId]) -> StoreResult<()> {
        match ids.iter().find(|id| !self.companies.contains_key(id)) {
            Some(missing) => Err(StoreError::validation(format!(
                "company {missing} does not exist"
            ))),
            None => Ok(()),
        }
    }
}

fn memberships(ids: &[CompanyId], default: Option<CompanyId>) -> Vec<Membership> {
    ids.iter()
        .map(|id| Membership {
            company_id: *id,
            is_default: Some(*id) == default,
        })
        .collect()
}

/// In-memory identity store for tests/dev.
///
/// A single mutex guards all state, so each method is atomic.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    inner: Mutex<State>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.inner.lock().map_err(|_| StoreError::poisoned())?;
        f(&mut state)
    }
}

#[async_trait::async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn count_users(&self) -> StoreResult<u64> {
        self.with_state(|s| Ok(s.users.len() as u64))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim();
        self.with_state(|s| {
            Ok(s.users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned())
        })
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.with_state(|s| Ok(s.users.get(&id).cloned()))
    }

    async fn list_users(&self, filter: UserFilter) -> StoreResult<Vec<User>> {
        self.with_state(|s| {
            Ok(s.users
                .values()
                .filter(|u| match &filter {
                    UserFilter::All => true,
                    UserFilter::InCompanies(ids) => {
                        u.memberships.iter().any(|m| ids.contains(&m.company_id))
                    }
                    UserFilter::Only(id) => u.id == *id,
                })
                .cloned()
                .collect())
        })
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        self.with_state(|s| {
            let email = new.email.trim().to_string();
            if s.email_taken(&email, None) {
                return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
            }
            let ids = dedup_companies(&new.company_ids);
            s.ensure_companies_exist(&ids)?;
            let default = pick_default(&ids, new.default_company_id, None)?;

            s.next_user_id += 1;
            let now = Utc::now();
            let user = User {
                id: UserId::new(s.next_user_id),
                email,
                password_hash: new.password_hash,
                name: new.name,
                role: new.role,
                memberships: memberships(&ids, default),
                created_at: now,
                updated_at: now,
            };
            s.users.insert(user.id, user.clone());
            Ok(user)
        })
    }

    async fn update_user(&self, id: UserId, patch: UserPatch) -> StoreResult<Option<User>> {
        self.with_state(|s| {
            let Some(current) = s.users.get(&id).cloned() else {
                return Ok(None);
            };

            let mut user = current;
            if let Some(email) = patch.email {
                let email = email.trim().to_string();
                if s.email_taken(&email, Some(id)) {
                    return Err(StoreError::Conflict(EMAIL_TAKEN.to_string()));
                }
                user.email = email;
            }
            if let Some(name) = patch.name {
                user.name = name;
            }
            if let Some(hash) = patch.password_hash {
                user.password_hash = hash;
            }
            if let Some(role) = patch.role {
                user.role = role;
            }

            if patch.company_ids.is_some() || patch.default_company_id.is_some() {
                let ids = match patch.company_ids {
                    Some(ids) => dedup_companies(&ids),
                    None => user.company_ids(),
                };
                s.ensure_companies_exist(&ids)?;
                let default = pick_default(&ids, patch.default_company_id, user.default_company_id())?;
                user.memberships = memberships(&ids, default);
            }

            user.updated_at = Utc::now();
            s.users.insert(id, user.clone());
            Ok(Some(user))
        })
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        self.with_state(|s| Ok(s.users.remove(&id).is_some()))
    }

    async fn list_companies(&self) -> StoreResult<Vec<Company>> {
        self.with_state(|s| {
            let mut out: Vec<Company> = s.companies.values().cloned().collect();
            out.sort_by_key(|c| c.code);
            Ok(out)
        })
    }

    async fn get_company(&self, id: CompanyId) -> StoreResult<Option<Company>> {
        self.with_state(|s| Ok(s.companies.get(&id).cloned()))
    }

    async fn root_company(&self) -> StoreResult<Option<Company>> {
        self.with_state(|s| {
            Ok(s.companies
                .values()
                .find(|c| c.code == ROOT_COMPANY_CODE)
                .cloned())
        })
    }

    async fn create_company(&self, new: NewCompany) -> StoreResult<Company> {
        self.with_state(|s| {
            let code = s
                .companies
                .values()
                .map(|c| c.code)
                .max()
                .map_or(ROOT_COMPANY_CODE, |max| max + 1);

            s.next_company_id += 1;
            let now = Utc::now();
            let company = Company {
                id: CompanyId::new(s.next_company_id),
                name: new.name,
                address: new.address,
                code,
                created_at: now,
                updated_at: now,
            };
            s.companies.insert(company.id, company.clone());
            Ok(company)
        })
    }

    async fn update_company(&self, id: CompanyId, patch: CompanyPatch) -> StoreResult<Option<Company>> {
        self.with_state(|s| {
            let Some(company) = s.companies.get_mut(&id) else {
                return Ok(None);
            };
            if let Some(name) = patch.name {
                company.name = name;
            }
            if let Some(address) = patch.address {
                company.address = address;
            }
            company.updated_at = Utc::now();
            Ok(Some(company.clone()))
        })
    }

    async fn delete_company(&self, id: CompanyId) -> StoreResult<bool> {
        self.with_state(|s| {
            if !s.companies.contains_key(&id) {
                return Ok(false);
            }
            let in_use = s
                .users
                .values()
                .any(|u| u.memberships.iter().any(|m| m.company_id == id));
            if in_use {
                return Err(StoreError::referential(COMPANY_IN_USE));
            }
            s.companies.remove(&id);
            Ok(true)
        })
    }
}
