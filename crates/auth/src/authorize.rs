//! Role and tenant authorization rules for user and company management.
//!
//! Everything here is a pure decision over the caller's [`Identity`] and a
//! snapshot of the target. No IO, no panics. The HTTP handlers load the
//! target, ask for a decision, and only then touch the store.

use serde::Serialize;
use thiserror::Error;

use zenit_core::{CompanyId, DomainError, UserId};

use crate::{Identity, Role};

/// Operations guarded by the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateCompany,
    ReadCompany,
    UpdateCompany,
    DeleteCompany,
    CreateUser,
    ListUsers,
    ReadUser,
    UpdateUser,
    DeleteUser,
}

/// How far a role's reach extends for one operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    Deny,
    /// Only the caller's own user record.
    OwnRecord,
    /// Records sharing at least one company with the caller's token.
    SharedCompanies,
    Any,
}

/// The authorization table.
pub const fn capability(role: Role, op: Operation) -> Grant {
    use Operation::*;

    match (role, op) {
        (Role::Admin, _) => Grant::Any,

        (_, CreateCompany | ReadCompany | UpdateCompany | DeleteCompany) => Grant::Deny,

        (Role::Superuser, CreateUser | ListUsers | ReadUser | UpdateUser | DeleteUser) => {
            Grant::SharedCompanies
        }

        (Role::User, ListUsers | ReadUser | UpdateUser) => Grant::OwnRecord,
        (Role::User, CreateUser | DeleteUser) => Grant::Deny,
    }
}

/// Highest role a caller may hand out (on create or on update).
pub const fn max_assignable_role(actor: Role) -> Option<Role> {
    match actor {
        Role::Admin => Some(Role::Admin),
        Role::Superuser => Some(Role::Superuser),
        Role::User => None,
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("{0}")]
    Forbidden(String),

    #[error("user not found")]
    NotFound,
}

impl AuthzError {
    fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(msg) => DomainError::forbidden(msg),
            AuthzError::NotFound => DomainError::not_found("user not found"),
        }
    }
}

/// What the engine needs to know about an existing user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    pub id: UserId,
    pub role: Role,
    pub company_ids: Vec<CompanyId>,
    pub default_company_id: Option<CompanyId>,
}

/// Requested changes to a user that carry authorization weight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub role: Option<Role>,
    /// Full replacement membership list.
    pub company_ids: Option<Vec<CompanyId>>,
    pub default_company_id: Option<CompanyId>,
}

/// Which users a caller may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserScope {
    All,
    SharedCompanies(Vec<CompanyId>),
    OnlySelf(UserId),
}

// ─────────────────────────────────────────────────────────────────────────────
// Companies
// ─────────────────────────────────────────────────────────────────────────────

pub fn authorize_company(actor: &Identity, op: Operation) -> Result<(), AuthzError> {
    match capability(actor.role, op) {
        Grant::Any => Ok(()),
        _ => Err(AuthzError::forbidden("only ADMIN users can manage companies")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

pub fn user_list_scope(actor: &Identity) -> Result<UserScope, AuthzError> {
    match capability(actor.role, Operation::ListUsers) {
        Grant::Any => Ok(UserScope::All),
        Grant::SharedCompanies => Ok(UserScope::SharedCompanies(actor.company_ids.clone())),
        Grant::OwnRecord => Ok(UserScope::OnlySelf(actor.user_id)),
        Grant::Deny => Err(AuthzError::forbidden("not allowed to list users")),
    }
}

/// Decide whether `actor` may create a user with `role` in `company_ids`.
///
/// `root_company` is the id of the company with code 0, if it exists.
pub fn authorize_user_create(
    actor: &Identity,
    role: Role,
    company_ids: &[CompanyId],
    root_company: Option<CompanyId>,
) -> Result<(), AuthzError> {
    let grant = capability(actor.role, Operation::CreateUser);
    if grant == Grant::Deny {
        return Err(AuthzError::forbidden("not allowed to create users"));
    }

    ensure_assignable(actor, role)?;

    if grant == Grant::SharedCompanies {
        if let Some(foreign) = company_ids.iter().find(|c| !actor.is_member_of(**c)) {
            return Err(AuthzError::forbidden(format!(
                "not a member of company {foreign}"
            )));
        }
    }

    if role == Role::Admin {
        ensure_root_membership(company_ids, root_company)?;
    }

    Ok(())
}

/// Decide whether `actor` may see user `requested`.
///
/// `target` is `None` when no such user exists.
pub fn authorize_user_read(
    actor: &Identity,
    requested: UserId,
    target: Option<&TargetUser>,
) -> Result<(), AuthzError> {
    visible_target(actor, Operation::ReadUser, requested, target).map(|_| ())
}

pub fn authorize_user_update(
    actor: &Identity,
    requested: UserId,
    target: Option<&TargetUser>,
    changes: &UserChanges,
    root_company: Option<CompanyId>,
) -> Result<(), AuthzError> {
    let grant = capability(actor.role, Operation::UpdateUser);
    let target = visible_target(actor, Operation::UpdateUser, requested, target)?;
    let is_self = target.id == actor.user_id;

    if grant == Grant::SharedCompanies && !is_self && target.role > actor.role {
        return Err(AuthzError::forbidden("cannot modify a user with higher privileges"));
    }

    let role_change = changes.role.filter(|r| *r != target.role);
    if let Some(new_role) = role_change {
        if is_self {
            return Err(AuthzError::forbidden("cannot change your own role"));
        }
        ensure_assignable(actor, new_role)?;
    }

    let final_ids = changes.company_ids.as_deref().unwrap_or(&target.company_ids);
    let default_change = changes
        .default_company_id
        .filter(|d| Some(*d) != target.default_company_id);
    let membership_change = !same_set(final_ids, &target.company_ids) || default_change.is_some();
    if membership_change {
        match capability(actor.role, Operation::CreateUser) {
            Grant::Any => {}
            Grant::SharedCompanies => {
                let mut touched = symmetric_difference(final_ids, &target.company_ids);
                touched.extend(default_change);
                if let Some(foreign) = touched.iter().find(|c| !actor.is_member_of(**c)) {
                    return Err(AuthzError::forbidden(format!(
                        "not a member of company {foreign}"
                    )));
                }
            }
            _ => return Err(AuthzError::forbidden("not allowed to change company memberships")),
        }
    }

    let final_role = changes.role.unwrap_or(target.role);
    if final_role == Role::Admin && (role_change.is_some() || membership_change) {
        ensure_root_membership(final_ids, root_company)?;
    }

    Ok(())
}

pub fn authorize_user_delete(
    actor: &Identity,
    requested: UserId,
    target: Option<&TargetUser>,
) -> Result<(), AuthzError> {
    let grant = capability(actor.role, Operation::DeleteUser);
    let target = visible_target(actor, Operation::DeleteUser, requested, target)?;

    if grant == Grant::SharedCompanies && target.id != actor.user_id && target.role > actor.role {
        return Err(AuthzError::forbidden("cannot delete a user with higher privileges"));
    }
    Ok(())
}

/// Apply the visibility part of the table to a (possibly missing) target.
///
/// Existence is disclosed (`NotFound`) only to callers with `Any`, or to a
/// caller asking about their own id.
fn visible_target<'a>(
    actor: &Identity,
    op: Operation,
    requested: UserId,
    target: Option<&'a TargetUser>,
) -> Result<&'a TargetUser, AuthzError> {
    match capability(actor.role, op) {
        Grant::Deny => Err(AuthzError::forbidden("not allowed")),
        Grant::OwnRecord => {
            if requested != actor.user_id {
                return Err(AuthzError::forbidden("access restricted to your own user"));
            }
            target.ok_or(AuthzError::NotFound)
        }
        Grant::SharedCompanies => {
            let target = target.ok_or_else(|| {
                AuthzError::forbidden("user does not share a company with you")
            })?;
            if target.id == actor.user_id || actor.shares_company_with(&target.company_ids) {
                Ok(target)
            } else {
                Err(AuthzError::forbidden("user does not share a company with you"))
            }
        }
        Grant::Any => target.ok_or(AuthzError::NotFound),
    }
}

fn ensure_assignable(actor: &Identity, role: Role) -> Result<(), AuthzError> {
    match max_assignable_role(actor.role) {
        Some(max) if role <= max => Ok(()),
        _ => Err(AuthzError::forbidden(format!("cannot assign role {role}"))),
    }
}

fn ensure_root_membership(
    company_ids: &[CompanyId],
    root_company: Option<CompanyId>,
) -> Result<(), AuthzError> {
    match root_company {
        Some(root) if company_ids.contains(&root) => Ok(()),
        _ => Err(AuthzError::forbidden(
            "ADMIN users must be members of the root company",
        )),
    }
}

fn same_set(a: &[CompanyId], b: &[CompanyId]) -> bool {
    a.iter().all(|c| b.contains(c)) && b.iter().all(|c| a.contains(c))
}

fn symmetric_difference(a: &[CompanyId], b: &[CompanyId]) -> Vec<CompanyId> {
    a.iter()
        .filter(|c| !b.contains(c))
        .chain(b.iter().filter(|c| !a.contains(c)))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: CompanyId = CompanyId::new(1);

    fn ids(v: &[i64]) -> Vec<CompanyId> {
        v.iter().copied().map(CompanyId::new).collect()
    }

    fn admin() -> Identity {
        Identity::new(UserId::new(1), Role::Admin, ids(&[1]))
    }

    fn superuser() -> Identity {
        Identity::new(UserId::new(2), Role::Superuser, ids(&[2, 3]))
    }

    fn user() -> Identity {
        Identity::new(UserId::new(3), Role::User, ids(&[2]))
    }

    fn target(id: i64, role: Role, companies: &[i64]) -> TargetUser {
        TargetUser {
            id: UserId::new(id),
            role,
            company_ids: ids(companies),
            default_company_id: companies.first().copied().map(CompanyId::new),
        }
    }

    fn forbidden<T: core::fmt::Debug>(r: Result<T, AuthzError>) -> bool {
        matches!(r, Err(AuthzError::Forbidden(_)))
    }

    // ── companies ──────────────────────────────────────────────────────────

    #[test]
    fn only_admin_manages_companies() {
        for op in [
            Operation::CreateCompany,
            Operation::ReadCompany,
            Operation::UpdateCompany,
            Operation::DeleteCompany,
        ] {
            assert!(authorize_company(&admin(), op).is_ok());
            assert!(forbidden(authorize_company(&superuser(), op)));
            assert!(forbidden(authorize_company(&user(), op)));
        }
    }

    // ── create ─────────────────────────────────────────────────────────────

    #[test]
    fn user_cannot_create_anyone() {
        assert!(forbidden(authorize_user_create(&user(), Role::User, &ids(&[2]), Some(ROOT))));
    }

    #[test]
    fn superuser_creates_users_and_superusers_in_own_companies() {
        let su = superuser();
        assert!(authorize_user_create(&su, Role::User, &ids(&[2]), Some(ROOT)).is_ok());
        assert!(authorize_user_create(&su, Role::Superuser, &ids(&[2, 3]), Some(ROOT)).is_ok());
    }

    #[test]
    fn superuser_cannot_target_foreign_company() {
        assert!(forbidden(authorize_user_create(
            &superuser(),
            Role::User,
            &ids(&[2, 5]),
            Some(ROOT)
        )));
    }

    #[test]
    fn superuser_cannot_create_admin() {
        assert!(forbidden(authorize_user_create(
            &superuser(),
            Role::Admin,
            &ids(&[2]),
            Some(ROOT)
        )));
    }

    #[test]
    fn admin_creates_admin_only_inside_root_company() {
        assert!(authorize_user_create(&admin(), Role::Admin, &ids(&[1]), Some(ROOT)).is_ok());
        assert!(forbidden(authorize_user_create(&admin(), Role::Admin, &ids(&[4]), Some(ROOT))));
        assert!(forbidden(authorize_user_create(&admin(), Role::Admin, &ids(&[1]), None)));
    }

    #[test]
    fn admin_creates_non_admins_anywhere() {
        assert!(authorize_user_create(&admin(), Role::User, &ids(&[9]), Some(ROOT)).is_ok());
        assert!(authorize_user_create(&admin(), Role::Superuser, &ids(&[9]), None).is_ok());
    }

    // ── list ───────────────────────────────────────────────────────────────

    #[test]
    fn list_scopes_follow_role() {
        assert_eq!(user_list_scope(&admin()), Ok(UserScope::All));
        assert_eq!(
            user_list_scope(&superuser()),
            Ok(UserScope::SharedCompanies(ids(&[2, 3])))
        );
        assert_eq!(user_list_scope(&user()), Ok(UserScope::OnlySelf(UserId::new(3))));
    }

    // ── read ───────────────────────────────────────────────────────────────

    #[test]
    fn user_reading_other_id_is_forbidden_even_if_missing() {
        let other = target(4, Role::User, &[2]);
        assert!(forbidden(authorize_user_read(&user(), UserId::new(4), Some(&other))));
        assert!(forbidden(authorize_user_read(&user(), UserId::new(999), None)));
    }

    #[test]
    fn user_reads_self() {
        let me = target(3, Role::User, &[2]);
        assert!(authorize_user_read(&user(), UserId::new(3), Some(&me)).is_ok());
    }

    #[test]
    fn superuser_reads_only_shared_company_users() {
        let shared = target(5, Role::User, &[3, 8]);
        let foreign = target(6, Role::User, &[8]);
        assert!(authorize_user_read(&superuser(), UserId::new(5), Some(&shared)).is_ok());
        assert!(forbidden(authorize_user_read(&superuser(), UserId::new(6), Some(&foreign))));
        assert!(forbidden(authorize_user_read(&superuser(), UserId::new(7), None)));
    }

    #[test]
    fn admin_gets_not_found_for_missing_ids() {
        assert_eq!(
            authorize_user_read(&admin(), UserId::new(404), None),
            Err(AuthzError::NotFound)
        );
        let anyone = target(8, Role::User, &[8]);
        assert!(authorize_user_read(&admin(), UserId::new(8), Some(&anyone)).is_ok());
    }

    // ── update ─────────────────────────────────────────────────────────────

    #[test]
    fn nobody_changes_own_role() {
        let me_admin = target(1, Role::Admin, &[1]);
        let demote = UserChanges {
            role: Some(Role::User),
            ..Default::default()
        };
        assert!(forbidden(authorize_user_update(
            &admin(),
            UserId::new(1),
            Some(&me_admin),
            &demote,
            Some(ROOT)
        )));

        let me_user = target(3, Role::User, &[2]);
        let promote = UserChanges {
            role: Some(Role::Superuser),
            ..Default::default()
        };
        assert!(forbidden(authorize_user_update(
            &user(),
            UserId::new(3),
            Some(&me_user),
            &promote,
            Some(ROOT)
        )));
    }

    #[test]
    fn restating_own_role_is_allowed() {
        let me = target(3, Role::User, &[2]);
        let same = UserChanges {
            role: Some(Role::User),
            ..Default::default()
        };
        assert!(authorize_user_update(&user(), UserId::new(3), Some(&me), &same, Some(ROOT)).is_ok());
    }

    #[test]
    fn user_updates_only_self_and_not_memberships() {
        let me = target(3, Role::User, &[2]);
        let other = target(4, Role::User, &[2]);
        let nothing = UserChanges::default();
        assert!(authorize_user_update(&user(), UserId::new(3), Some(&me), &nothing, Some(ROOT)).is_ok());
        assert!(forbidden(authorize_user_update(
            &user(),
            UserId::new(4),
            Some(&other),
            &nothing,
            Some(ROOT)
        )));

        let move_me = UserChanges {
            company_ids: Some(ids(&[2, 3])),
            ..Default::default()
        };
        assert!(forbidden(authorize_user_update(
            &user(),
            UserId::new(3),
            Some(&me),
            &move_me,
            Some(ROOT)
        )));
    }

    #[test]
    fn user_cannot_move_own_default_company() {
        let me = target(3, Role::User, &[2, 4]);
        let switch = UserChanges {
            default_company_id: Some(CompanyId::new(4)),
            ..Default::default()
        };
        assert!(forbidden(authorize_user_update(
            &user(),
            UserId::new(3),
            Some(&me),
            &switch,
            Some(ROOT)
        )));

        let restate = UserChanges {
            default_company_id: Some(CompanyId::new(2)),
            ..Default::default()
        };
        assert!(authorize_user_update(&user(), UserId::new(3), Some(&me), &restate, Some(ROOT)).is_ok());
    }

    #[test]
    fn superuser_cannot_promote_to_admin() {
        let t = target(5, Role::User, &[2]);
        let promote = UserChanges {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(forbidden(authorize_user_update(
            &superuser(),
            UserId::new(5),
            Some(&t),
            &promote,
            Some(ROOT)
        )));
    }

    #[test]
    fn superuser_updates_shared_user_within_own_companies() {
        let t = target(5, Role::User, &[2]);
        let changes = UserChanges {
            role: Some(Role::Superuser),
            company_ids: Some(ids(&[2, 3])),
            ..Default::default()
        };
        assert!(authorize_user_update(&superuser(), UserId::new(5), Some(&t), &changes, Some(ROOT)).is_ok());

        let foreign = UserChanges {
            company_ids: Some(ids(&[2, 9])),
            ..Default::default()
        };
        assert!(forbidden(authorize_user_update(
            &superuser(),
            UserId::new(5),
            Some(&t),
            &foreign,
            Some(ROOT)
        )));
    }

    #[test]
    fn superuser_cannot_touch_admin_targets() {
        let a = target(9, Role::Admin, &[1, 2]);
        assert!(forbidden(authorize_user_update(
            &superuser(),
            UserId::new(9),
            Some(&a),
            &UserChanges::default(),
            Some(ROOT)
        )));
        assert!(forbidden(authorize_user_delete(&superuser(), UserId::new(9), Some(&a))));
    }

    #[test]
    fn admin_promotion_requires_root_membership() {
        let outside = target(5, Role::User, &[4]);
        let promote = UserChanges {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(forbidden(authorize_user_update(
            &admin(),
            UserId::new(5),
            Some(&outside),
            &promote,
            Some(ROOT)
        )));

        let promote_and_join = UserChanges {
            role: Some(Role::Admin),
            company_ids: Some(ids(&[1, 4])),
            ..Default::default()
        };
        assert!(authorize_user_update(
            &admin(),
            UserId::new(5),
            Some(&outside),
            &promote_and_join,
            Some(ROOT)
        )
        .is_ok());
    }

    #[test]
    fn admin_update_of_missing_user_is_not_found() {
        assert_eq!(
            authorize_user_update(&admin(), UserId::new(77), None, &UserChanges::default(), Some(ROOT)),
            Err(AuthzError::NotFound)
        );
    }

    // ── delete ─────────────────────────────────────────────────────────────

    #[test]
    fn delete_rules() {
        let shared = target(5, Role::User, &[2]);
        let foreign = target(6, Role::User, &[7]);

        assert!(forbidden(authorize_user_delete(&user(), UserId::new(5), Some(&shared))));
        assert!(authorize_user_delete(&superuser(), UserId::new(5), Some(&shared)).is_ok());
        assert!(forbidden(authorize_user_delete(&superuser(), UserId::new(6), Some(&foreign))));
        assert!(authorize_user_delete(&admin(), UserId::new(6), Some(&foreign)).is_ok());
        assert_eq!(
            authorize_user_delete(&admin(), UserId::new(66), None),
            Err(AuthzError::NotFound)
        );
    }

    #[test]
    fn table_is_monotonic_in_privilege() {
        fn rank(g: Grant) -> u8 {
            match g {
                Grant::Deny => 0,
                Grant::OwnRecord => 1,
                Grant::SharedCompanies => 2,
                Grant::Any => 3,
            }
        }
        let ops = [
            Operation::CreateCompany,
            Operation::ReadCompany,
            Operation::UpdateCompany,
            Operation::DeleteCompany,
            Operation::CreateUser,
            Operation::ListUsers,
            Operation::ReadUser,
            Operation::UpdateUser,
            Operation::DeleteUser,
        ];
        for op in ops {
            assert!(rank(capability(Role::User, op)) <= rank(capability(Role::Superuser, op)));
            assert!(rank(capability(Role::Superuser, op)) <= rank(capability(Role::Admin, op)));
        }
    }
}
