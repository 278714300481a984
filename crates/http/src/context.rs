use zenit_auth::{Identity, Role};
use zenit_core::{CompanyId, UserId};

/// The verified caller of a request.
///
/// Inserted by the auth middleware of either service; handlers take it with
/// `Extension<PrincipalContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    identity: Identity,
}

impl PrincipalContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub fn company_ids(&self) -> &[CompanyId] {
        &self.identity.company_ids
    }
}

/// Company the request operates on.
///
/// This is immutable and must be present for all tenant-scoped routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    company_id: CompanyId,
}

impl TenantContext {
    pub fn new(company_id: CompanyId) -> Self {
        Self { company_id }
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }
}
