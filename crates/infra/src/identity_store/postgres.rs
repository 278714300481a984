//! Postgres-backed identity store.
//!
//! Tables live in the `core` schema (see `migrations/core.sql`). Each mutating
//! method runs in one transaction; an early return drops the transaction and
//! rolls it back.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use zenit_auth::Role;
use zenit_core::{CompanyId, UserId};

use super::{
    COMPANY_HAS_RECORDS, COMPANY_IN_USE, Company, CompanyPatch, EMAIL_TAKEN, IdentityStore,
    Membership, NewCompany, NewUser, ROOT_COMPANY_CODE, User, UserFilter, UserPatch, dedup_companies, pick_default,
};
use crate::error::{StoreError, StoreResult, map_sqlx_error};

/// Arbitrary key for the advisory lock serializing company code assignment.
const COMPANY_CODE_LOCK: i64 = 0x7a65_6e69_7401;

const USER_COLUMNS: &str =
    r#"id, email, password, name, role::text AS role, created_at, updated_at"#;

#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: PgPool,
}

impl PostgresIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self, operation: &str) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, "", e))
    }

    async fn load_memberships(&self, user_ids: &[i64]) -> StoreResult<Vec<(i64, Membership)>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, company_id, is_default
            FROM core.user_company
            WHERE user_id = ANY($1)
            ORDER BY user_id, is_default DESC, company_id
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_memberships", "", e))?;

        rows.iter()
            .map(|row| -> Result<(i64, Membership), sqlx::Error> {
                Ok((
                    row.try_get::<i64, _>("user_id")?,
                    Membership {
                        company_id: CompanyId::new(row.try_get("company_id")?),
                        is_default: row.try_get("is_default")?,
                    },
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("load_memberships", "", e))
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> StoreResult<Vec<User>> {
        let mut users = rows
            .iter()
            .map(user_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        if users.is_empty() {
            return Ok(users);
        }

        let ids: Vec<i64> = users.iter().map(|u| u.id.get()).collect();
        for (user_id, membership) in self.load_memberships(&ids).await? {
            if let Some(user) = users.iter_mut().find(|u| u.id.get() == user_id) {
                user.memberships.push(membership);
            }
        }
        Ok(users)
    }

    async fn get_one(&self, sql: &str, operation: &str, bind: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, "", e))?;
        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }
}

/// A foreign-key failure on delete means some other table still references
/// the company; memberships were already checked.
fn company_delete_error(err: StoreError) -> StoreError {
    match err {
        StoreError::Referential(_) => StoreError::referential(COMPANY_HAS_RECORDS),
        other => other,
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let parse = || -> Result<User, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(User {
            id: UserId::new(row.try_get("id")?),
            email: row.try_get("email")?,
            password_hash: row.try_get("password")?,
            name: row.try_get("name")?,
            role: role.parse::<Role>().unwrap_or_default(),
            memberships: Vec::new(),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    };
    parse().map_err(|e| map_sqlx_error("decode_user", "", e))
}

fn company_from_row(row: &PgRow) -> StoreResult<Company> {
    let parse = || -> Result<Company, sqlx::Error> {
        Ok(Company {
            id: CompanyId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            code: row.try_get("code")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    };
    parse().map_err(|e| map_sqlx_error("decode_company", "", e))
}

async fn ensure_companies_exist(
    tx: &mut Transaction<'static, Postgres>,
    ids: &[CompanyId],
) -> StoreResult<()> {
    let raw: Vec<i64> = ids.iter().map(|c| c.get()).collect();
    let found: Vec<i64> = sqlx::query_scalar("SELECT id FROM core.company WHERE id = ANY($1)")
        .bind(&raw)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_companies_exist", "", e))?;

    match raw.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(StoreError::validation(format!(
            "company {missing} does not exist"
        ))),
        None => Ok(()),
    }
}

/// Replace a user's memberships. Defaults are cleared before the new one is set.
async fn replace_memberships(
    tx: &mut Transaction<'static, Postgres>,
    user_id: i64,
    ids: &[CompanyId],
    default: Option<CompanyId>,
) -> StoreResult<()> {
    let raw: Vec<i64> = ids.iter().map(|c| c.get()).collect();

    sqlx::query("DELETE FROM core.user_company WHERE user_id = $1 AND NOT (company_id = ANY($2))")
        .bind(user_id)
        .bind(&raw)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("prune_memberships", "", e))?;

    sqlx::query("UPDATE core.user_company SET is_default = FALSE WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("clear_default_membership", "", e))?;

    for company_id in &raw {
        sqlx::query(
            r#"
            INSERT INTO core.user_company (user_id, company_id, is_default)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, company_id) DO UPDATE SET is_default = EXCLUDED.is_default
            "#,
        )
        .bind(user_id)
        .bind(company_id)
        .bind(default.map(|d| d.get()) == Some(*company_id))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_membership", "", e))?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self), err)]
    async fn count_users(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM core."user""#)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_users", "", e))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, email), err)]
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!(
            r#"SELECT {USER_COLUMNS} FROM core."user" WHERE lower(email) = lower($1)"#
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", "", e))?;
        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.get_one(
            &format!(r#"SELECT {USER_COLUMNS} FROM core."user" WHERE id = $1"#),
            "get_user",
            id.get(),
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self, filter: UserFilter) -> StoreResult<Vec<User>> {
        let query = match &filter {
            UserFilter::All => sqlx::query_scalar::<_, i64>(r#"SELECT id FROM core."user""#),
            UserFilter::InCompanies(_) => sqlx::query_scalar::<_, i64>(
                "SELECT DISTINCT user_id FROM core.user_company WHERE company_id = ANY($1)",
            ),
            UserFilter::Only(_) => {
                sqlx::query_scalar::<_, i64>(r#"SELECT id FROM core."user" WHERE id = $1"#)
            }
        };
        let query = match &filter {
            UserFilter::All => query,
            UserFilter::InCompanies(ids) => {
                query.bind(ids.iter().map(|c| c.get()).collect::<Vec<i64>>())
            }
            UserFilter::Only(id) => query.bind(id.get()),
        };
        let ids: Vec<i64> = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_user_ids", "", e))?;

        let rows = sqlx::query(&format!(
            r#"SELECT {USER_COLUMNS} FROM core."user" WHERE id = ANY($1) ORDER BY id"#
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", "", e))?;
        self.hydrate(rows).await
    }

    #[instrument(skip(self, new), fields(email = %new.email), err)]
    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let ids = dedup_companies(&new.company_ids);
        let default = pick_default(&ids, new.default_company_id, None)?;

        let mut tx = self.begin("create_user").await?;
        ensure_companies_exist(&mut tx, &ids).await?;

        let user_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO core."user" (email, password, name, role)
            VALUES ($1, $2, $3, $4::core.role)
            RETURNING id
            "#,
        )
        .bind(new.email.trim())
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(new.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_user", EMAIL_TAKEN, e))?;

        replace_memberships(&mut tx, user_id, &ids, default).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", EMAIL_TAKEN, e))?;

        self.get_user(UserId::new(user_id))
            .await?
            .ok_or_else(|| StoreError::Internal("created user vanished".to_string()))
    }

    #[instrument(skip(self, patch), fields(user_id = %id), err)]
    async fn update_user(&self, id: UserId, patch: UserPatch) -> StoreResult<Option<User>> {
        let Some(current) = self.get_user(id).await? else {
            return Ok(None);
        };

        let mut tx = self.begin("update_user").await?;

        let updated = sqlx::query(
            r#"
            UPDATE core."user"
            SET email = COALESCE($2, email),
                password = COALESCE($3, password),
                name = COALESCE($4, name),
                role = COALESCE($5::core.role, role),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(patch.email.as_deref().map(str::trim))
        .bind(patch.password_hash.as_deref())
        .bind(patch.name.as_deref())
        .bind(patch.role.map(|r| r.as_str()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_user", EMAIL_TAKEN, e))?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        if patch.company_ids.is_some() || patch.default_company_id.is_some() {
            let ids = match &patch.company_ids {
                Some(ids) => dedup_companies(ids),
                None => current.company_ids(),
            };
            let default = pick_default(&ids, patch.default_company_id, current.default_company_id())?;
            ensure_companies_exist(&mut tx, &ids).await?;
            replace_memberships(&mut tx, id.get(), &ids, default).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", EMAIL_TAKEN, e))?;
        self.get_user(id).await
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_user(&self, id: UserId) -> StoreResult<bool> {
        let mut tx = self.begin("delete_user").await?;

        sqlx::query("DELETE FROM core.user_company WHERE user_id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_memberships", "", e))?;

        let deleted = sqlx::query(r#"DELETE FROM core."user" WHERE id = $1"#)
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user", "", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "", e))?;
        Ok(deleted.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn list_companies(&self) -> StoreResult<Vec<Company>> {
        let rows = sqlx::query("SELECT * FROM core.company ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_companies", "", e))?;
        rows.iter().map(company_from_row).collect()
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn get_company(&self, id: CompanyId) -> StoreResult<Option<Company>> {
        let row = sqlx::query("SELECT * FROM core.company WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_company", "", e))?;
        row.as_ref().map(company_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn root_company(&self) -> StoreResult<Option<Company>> {
        let row = sqlx::query("SELECT * FROM core.company WHERE code = $1")
            .bind(ROOT_COMPANY_CODE)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("root_company", "", e))?;
        row.as_ref().map(company_from_row).transpose()
    }

    #[instrument(skip(self, new), fields(name = %new.name), err)]
    async fn create_company(&self, new: NewCompany) -> StoreResult<Company> {
        let mut tx = self.begin("create_company").await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(COMPANY_CODE_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_company_code", "", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO core.company (name, address, code)
            VALUES ($1, $2, (SELECT COALESCE(MAX(code) + 1, 0) FROM core.company))
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(new.address.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_company", "company code already taken", e))?;
        let company = company_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "company code already taken", e))?;
        Ok(company)
    }

    #[instrument(skip(self, patch), fields(company_id = %id), err)]
    async fn update_company(&self, id: CompanyId, patch: CompanyPatch) -> StoreResult<Option<Company>> {
        let row = sqlx::query(
            r#"
            UPDATE core.company
            SET name = COALESCE($2, name),
                address = CASE WHEN $3 THEN $4 ELSE address END,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(patch.name.as_deref())
        .bind(patch.address.is_some())
        .bind(patch.address.clone().flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_company", "", e))?;
        row.as_ref().map(company_from_row).transpose()
    }

    #[instrument(skip(self), fields(company_id = %id), err)]
    async fn delete_company(&self, id: CompanyId) -> StoreResult<bool> {
        let mut tx = self.begin("delete_company").await?;

        let linked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM core.user_company WHERE company_id = $1)",
        )
        .bind(id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("company_links", "", e))?;
        if linked {
            return Err(StoreError::referential(COMPANY_IN_USE));
        }

        let deleted = sqlx::query("DELETE FROM core.company WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| company_delete_error(map_sqlx_error("delete_company", "", e)))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "", e))?;
        Ok(deleted.rows_affected() > 0)
    }
}
