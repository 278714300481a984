//! First-run setup: Root Company and an ADMIN account.
//!
//! Registration is disabled, so an empty deployment needs one seeded admin.

use zenit_auth::{Role, password};
use zenit_core::{DomainError, DomainResult};
use zenit_infra::config::BootstrapAdmin;
use zenit_infra::identity_store::{IdentityStore, NewCompany, NewUser, User};

/// Seed the admin when the user table is empty.
///
/// Returns the created user, or `None` when users already exist.
pub async fn ensure_admin(
    store: &dyn IdentityStore,
    admin: &BootstrapAdmin,
) -> DomainResult<Option<User>> {
    if store.count_users().await? > 0 {
        tracing::debug!("users present; skipping admin bootstrap");
        return Ok(None);
    }

    let root = match store.root_company().await? {
        Some(root) => root,
        None => {
            store
                .create_company(NewCompany {
                    name: admin.root_company_name.clone(),
                    address: None,
                })
                .await?
        }
    };

    let plain = admin.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| DomainError::internal(format!("hashing task failed: {e}")))??;

    let user = store
        .create_user(NewUser {
            email: admin.email.trim().to_string(),
            password_hash,
            name: "Administrator".to_string(),
            role: Role::Admin,
            company_ids: vec![root.id],
            default_company_id: Some(root.id),
        })
        .await?;

    tracing::info!(user_id = %user.id, root_company_id = %root.id, "bootstrap admin created");
    Ok(Some(user))
}
