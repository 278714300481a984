use serde::{Deserialize, Serialize};

use zenit_core::{CompanyId, UserId};

use crate::Role;

/// A verified caller identity: who, with which role, member of which companies.
///
/// This is exactly the payload of `GET /api/auth/verify`, and the value both
/// services attach to a request once the bearer token has been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    #[serde(default)]
    pub company_ids: Vec<CompanyId>,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role, company_ids: Vec<CompanyId>) -> Self {
        Self {
            user_id,
            role,
            company_ids,
        }
    }

    pub fn is_member_of(&self, company_id: CompanyId) -> bool {
        self.company_ids.contains(&company_id)
    }

    /// True when at least one of `companies` is also one of ours.
    pub fn shares_company_with(&self, companies: &[CompanyId]) -> bool {
        companies.iter().any(|c| self.is_member_of(*c))
    }

    /// First membership carried by the token, used as the implicit tenant.
    pub fn first_company(&self) -> Option<CompanyId> {
        self.company_ids.first().copied()
    }
}

/// Tenant access check: ADMIN always passes, everybody else needs membership.
pub fn has_access(identity: &Identity, company_id: CompanyId) -> bool {
    identity.role == Role::Admin || identity.is_member_of(company_id)
}
