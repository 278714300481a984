use core::str::FromStr;

use serde::{Deserialize, Serialize};

use zenit_core::DomainError;

/// Role identifier used for RBAC.
///
/// Variants are declared in ascending privilege order, so the derived `Ord`
/// is the privilege order: `User < Superuser < Admin`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Superuser,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Superuser, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Superuser => "SUPERUSER",
            Role::Admin => "ADMIN",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "SUPERUSER" => Ok(Role::Superuser),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(DomainError::validation(
                "role must be one of: ADMIN, SUPERUSER, USER",
            )),
        }
    }
}
