//! Postgres-backed financial store.
//!
//! Tables live in the `zenit` schema (see `migrations/financial.sql`).
//!
//! ## Ledger consistency
//!
//! Transaction writes lock the transaction row with `SELECT ... FOR UPDATE`,
//! then apply the planned adjustments as `balance = balance + delta` inside
//! the same sqlx `Transaction`. Two concurrent updates of one transaction are
//! therefore serialized, and the second one plans against the first one's
//! committed state.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use zenit_core::{AccountId, CategoryId, CompanyId, TransactionId, UserId};
use zenit_ledger::{BalanceAdjustment, plan_create, plan_delete, plan_update};

use super::{
    ACCOUNT_IN_USE, AccountPatch, AccountRef, CATEGORY_IN_USE, CategoryFilter, CategoryPatch,
    CategoryRef, DEFAULT_CATEGORY_COLOR, FinancialAccount, FinancialCategory, FinancialStore,
    FinancialTransaction, NewAccount, NewCategory, NewTransaction, TransactionDetail,
    TransactionFilter, TransactionListItem, TransactionPatch, UNKNOWN_ACCOUNT, UNKNOWN_CATEGORY,
    money, positive_amount,
};
use crate::error::{StoreError, StoreResult, map_sqlx_error};

type Tx = Transaction<'static, Postgres>;

#[derive(Debug, Clone)]
pub struct PostgresFinancialStore {
    pool: PgPool,
}

impl PostgresFinancialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self, operation: &str) -> StoreResult<Tx> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, "", e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding
// ─────────────────────────────────────────────────────────────────────────────

fn decode_err(what: &str, e: sqlx::Error) -> StoreError {
    map_sqlx_error(what, "", e)
}

fn account_from_row(row: &PgRow) -> StoreResult<FinancialAccount> {
    let parse = || -> Result<FinancialAccount, sqlx::Error> {
        Ok(FinancialAccount {
            id: AccountId::new(row.try_get("id")?),
            company_id: CompanyId::new(row.try_get("company_id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            name: row.try_get("name")?,
            account_type: row.try_get("type")?,
            balance: row.try_get("balance")?,
            account_number: row.try_get("account_number")?,
            bank_name: row.try_get("bank_name")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    };
    parse().map_err(|e| decode_err("decode_account", e))
}

fn category_from_row(row: &PgRow) -> StoreResult<FinancialCategory> {
    let kind: String = row.try_get("type").map_err(|e| decode_err("decode_category", e))?;
    let parse = || -> Result<FinancialCategory, sqlx::Error> {
        Ok(FinancialCategory {
            id: CategoryId::new(row.try_get("id")?),
            company_id: CompanyId::new(row.try_get("company_id")?),
            name: row.try_get("name")?,
            category_type: kind
                .parse()
                .map_err(|_| sqlx::Error::Decode(format!("bad category type {kind}").into()))?,
            color: row.try_get("color")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    };
    parse().map_err(|e| decode_err("decode_category", e))
}

fn transaction_from_row(row: &PgRow) -> StoreResult<FinancialTransaction> {
    let parse = || -> Result<FinancialTransaction, sqlx::Error> {
        let kind: String = row.try_get("type")?;
        let status: String = row.try_get("status")?;
        Ok(FinancialTransaction {
            id: TransactionId::new(row.try_get("id")?),
            company_id: CompanyId::new(row.try_get("company_id")?),
            account_id: AccountId::new(row.try_get("account_id")?),
            category_id: row.try_get::<Option<i64>, _>("category_id")?.map(CategoryId::new),
            user_id: UserId::new(row.try_get("user_id")?),
            description: row.try_get("description")?,
            amount: row.try_get("amount")?,
            date: row.try_get("date")?,
            transaction_type: kind
                .parse()
                .map_err(|_| sqlx::Error::Decode(format!("bad transaction type {kind}").into()))?,
            status: status
                .parse()
                .map_err(|_| sqlx::Error::Decode(format!("bad transaction status {status}").into()))?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    };
    parse().map_err(|e| decode_err("decode_transaction", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit-of-work helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn check_refs(
    tx: &mut Tx,
    company_id: CompanyId,
    account_id: AccountId,
    category_id: Option<CategoryId>,
) -> StoreResult<()> {
    let account_ok: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM zenit.financial_account WHERE id = $1 AND company_id = $2)",
    )
    .bind(account_id.get())
    .bind(company_id.get())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_account", "", e))?;
    if !account_ok {
        return Err(StoreError::validation(UNKNOWN_ACCOUNT));
    }

    if let Some(category_id) = category_id {
        let category_ok: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM zenit.financial_category WHERE id = $1 AND company_id = $2)",
        )
        .bind(category_id.get())
        .bind(company_id.get())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("check_category", "", e))?;
        if !category_ok {
            return Err(StoreError::validation(UNKNOWN_CATEGORY));
        }
    }
    Ok(())
}

async fn apply_adjustments(tx: &mut Tx, plan: &[BalanceAdjustment]) -> StoreResult<()> {
    for adj in plan {
        let updated = sqlx::query(
            r#"
            UPDATE zenit.financial_account
            SET balance = balance + $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(adj.account_id.get())
        .bind(adj.delta)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("adjust_balance", "", e))?;

        if updated.rows_affected() != 1 {
            return Err(StoreError::Internal(format!(
                "balance adjustment hit {} rows for account {}",
                updated.rows_affected(),
                adj.account_id
            )));
        }
    }
    Ok(())
}

async fn lock_transaction(
    tx: &mut Tx,
    company_id: CompanyId,
    id: TransactionId,
) -> StoreResult<Option<FinancialTransaction>> {
    let row = sqlx::query(
        "SELECT * FROM zenit.financial_transaction WHERE id = $1 AND company_id = $2 FOR UPDATE",
    )
    .bind(id.get())
    .bind(company_id.get())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_transaction", "", e))?;
    row.as_ref().map(transaction_from_row).transpose()
}

const ACCOUNT_HAS_TRANSACTIONS: &str =
    "SELECT EXISTS (SELECT 1 FROM zenit.financial_transaction WHERE account_id = $1)";
const CATEGORY_HAS_TRANSACTIONS: &str =
    "SELECT EXISTS (SELECT 1 FROM zenit.financial_transaction WHERE category_id = $1)";

async fn has_linked_transactions(tx: &mut Tx, sql: &'static str, id: i64) -> StoreResult<bool> {
    sqlx::query_scalar(sql)
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("linked_transactions", "", e))
}

#[async_trait::async_trait]
impl FinancialStore for PostgresFinancialStore {
    // ── accounts ───────────────────────────────────────────────────────────

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_accounts(&self, company_id: CompanyId) -> StoreResult<Vec<FinancialAccount>> {
        let rows = sqlx::query(
            "SELECT * FROM zenit.financial_account WHERE company_id = $1 ORDER BY name, id",
        )
        .bind(company_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_accounts", "", e))?;
        rows.iter().map(account_from_row).collect()
    }

    #[instrument(skip(self), fields(company_id = %company_id, account_id = %id), err)]
    async fn get_account(&self, company_id: CompanyId, id: AccountId) -> StoreResult<Option<FinancialAccount>> {
        let row = sqlx::query("SELECT * FROM zenit.financial_account WHERE id = $1 AND company_id = $2")
            .bind(id.get())
            .bind(company_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_account", "", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self, new), fields(company_id = %company_id), err)]
    async fn create_account(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        new: NewAccount,
    ) -> StoreResult<FinancialAccount> {
        let row = sqlx::query(
            r#"
            INSERT INTO zenit.financial_account
                (company_id, user_id, name, type, balance, account_number, bank_name, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(company_id.get())
        .bind(user_id.get())
        .bind(&new.name)
        .bind(&new.account_type)
        .bind(money(new.balance))
        .bind(new.account_number.as_deref())
        .bind(new.bank_name.as_deref())
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_account", "account already exists", e))?;
        account_from_row(&row)
    }

    #[instrument(skip(self, patch), fields(company_id = %company_id, account_id = %id), err)]
    async fn update_account(
        &self,
        company_id: CompanyId,
        id: AccountId,
        patch: AccountPatch,
    ) -> StoreResult<Option<FinancialAccount>> {
        let row = sqlx::query(
            r#"
            UPDATE zenit.financial_account
            SET name = COALESCE($3, name),
                type = COALESCE($4, type),
                account_number = CASE WHEN $5 THEN $6 ELSE account_number END,
                bank_name = CASE WHEN $7 THEN $8 ELSE bank_name END,
                is_active = COALESCE($9, is_active),
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(company_id.get())
        .bind(patch.name.as_deref())
        .bind(patch.account_type.as_deref())
        .bind(patch.account_number.is_some())
        .bind(patch.account_number.clone().flatten())
        .bind(patch.bank_name.is_some())
        .bind(patch.bank_name.clone().flatten())
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_account", "", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self), fields(company_id = %company_id, account_id = %id), err)]
    async fn delete_account(&self, company_id: CompanyId, id: AccountId) -> StoreResult<bool> {
        let mut tx = self.begin("delete_account").await?;

        let locked: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM zenit.financial_account WHERE id = $1 AND company_id = $2 FOR UPDATE",
        )
        .bind(id.get())
        .bind(company_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_account", "", e))?;
        if locked.is_none() {
            return Ok(false);
        }
        if has_linked_transactions(&mut tx, ACCOUNT_HAS_TRANSACTIONS, id.get()).await? {
            return Err(StoreError::referential(ACCOUNT_IN_USE));
        }

        sqlx::query("DELETE FROM zenit.financial_account WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| match map_sqlx_error("delete_account", "", e) {
                StoreError::Referential(_) => StoreError::referential(ACCOUNT_IN_USE),
                other => other,
            })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "", e))?;
        Ok(true)
    }

    // ── categories ─────────────────────────────────────────────────────────

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_categories(
        &self,
        company_id: CompanyId,
        filter: CategoryFilter,
    ) -> StoreResult<Vec<FinancialCategory>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM zenit.financial_category
            WHERE company_id = $1 AND ($2::text IS NULL OR type = $2)
            ORDER BY name, id
            "#,
        )
        .bind(company_id.get())
        .bind(filter.category_type.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_categories", "", e))?;
        rows.iter().map(category_from_row).collect()
    }

    #[instrument(skip(self), fields(company_id = %company_id, category_id = %id), err)]
    async fn get_category(&self, company_id: CompanyId, id: CategoryId) -> StoreResult<Option<FinancialCategory>> {
        let row = sqlx::query("SELECT * FROM zenit.financial_category WHERE id = $1 AND company_id = $2")
            .bind(id.get())
            .bind(company_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", "", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    #[instrument(skip(self, new), fields(company_id = %company_id), err)]
    async fn create_category(&self, company_id: CompanyId, new: NewCategory) -> StoreResult<FinancialCategory> {
        let row = sqlx::query(
            r#"
            INSERT INTO zenit.financial_category (company_id, name, type, color)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(company_id.get())
        .bind(&new.name)
        .bind(new.category_type.as_str())
        .bind(new.color.as_deref().unwrap_or(DEFAULT_CATEGORY_COLOR))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_category", "category already exists", e))?;
        category_from_row(&row)
    }

    #[instrument(skip(self, patch), fields(company_id = %company_id, category_id = %id), err)]
    async fn update_category(
        &self,
        company_id: CompanyId,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> StoreResult<Option<FinancialCategory>> {
        let row = sqlx::query(
            r#"
            UPDATE zenit.financial_category
            SET name = COALESCE($3, name),
                type = COALESCE($4, type),
                color = COALESCE($5, color),
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(company_id.get())
        .bind(patch.name.as_deref())
        .bind(patch.category_type.map(|k| k.as_str()))
        .bind(patch.color.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_category", "", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    #[instrument(skip(self), fields(company_id = %company_id, category_id = %id), err)]
    async fn delete_category(&self, company_id: CompanyId, id: CategoryId) -> StoreResult<bool> {
        let mut tx = self.begin("delete_category").await?;

        let locked: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM zenit.financial_category WHERE id = $1 AND company_id = $2 FOR UPDATE",
        )
        .bind(id.get())
        .bind(company_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_category", "", e))?;
        if locked.is_none() {
            return Ok(false);
        }
        if has_linked_transactions(&mut tx, CATEGORY_HAS_TRANSACTIONS, id.get()).await? {
            return Err(StoreError::referential(CATEGORY_IN_USE));
        }

        sqlx::query("DELETE FROM zenit.financial_category WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| match map_sqlx_error("delete_category", "", e) {
                StoreError::Referential(_) => StoreError::referential(CATEGORY_IN_USE),
                other => other,
            })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "", e))?;
        Ok(true)
    }

    // ── transactions ───────────────────────────────────────────────────────

    #[instrument(skip(self), fields(company_id = %company_id), err)]
    async fn list_transactions(
        &self,
        company_id: CompanyId,
        filter: TransactionFilter,
    ) -> StoreResult<Vec<TransactionListItem>> {
        let rows = sqlx::query(
            r#"
            SELECT t.*,
                   a.name  AS account_name,
                   c.name  AS category_name,
                   c.color AS category_color
            FROM zenit.financial_transaction t
            JOIN zenit.financial_account a ON a.id = t.account_id
            LEFT JOIN zenit.financial_category c ON c.id = t.category_id
            WHERE t.company_id = $1
                AND ($2::timestamptz IS NULL OR t.date >= $2)
                AND ($3::timestamptz IS NULL OR t.date <= $3)
                AND ($4::bigint IS NULL OR t.account_id = $4)
                AND ($5::bigint IS NULL OR t.category_id = $5)
                AND ($6::text IS NULL OR t.type = $6)
                AND ($7::text IS NULL OR t.status = $7)
            ORDER BY t.date DESC, t.id DESC
            "#,
        )
        .bind(company_id.get())
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.account_id.map(|a| a.get()))
        .bind(filter.category_id.map(|c| c.get()))
        .bind(filter.transaction_type.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_transactions", "", e))?;

        rows.iter()
            .map(|row| {
                let transaction = transaction_from_row(row)?;
                let refs = || -> Result<(String, Option<String>, Option<String>), sqlx::Error> {
                    Ok((
                        row.try_get("account_name")?,
                        row.try_get("category_name")?,
                        row.try_get("category_color")?,
                    ))
                };
                let (account_name, category_name, category_color) =
                    refs().map_err(|e| decode_err("decode_transaction_refs", e))?;

                let category = match (transaction.category_id, category_name) {
                    (Some(id), Some(name)) => Some(CategoryRef {
                        id,
                        name,
                        color: category_color.unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
                    }),
                    _ => None,
                };
                Ok(TransactionListItem {
                    account: AccountRef {
                        id: transaction.account_id,
                        name: account_name,
                    },
                    category,
                    transaction,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %id), err)]
    async fn get_transaction(
        &self,
        company_id: CompanyId,
        id: TransactionId,
    ) -> StoreResult<Option<TransactionDetail>> {
        let row = sqlx::query("SELECT * FROM zenit.financial_transaction WHERE id = $1 AND company_id = $2")
            .bind(id.get())
            .bind(company_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_transaction", "", e))?;
        let Some(transaction) = row.as_ref().map(transaction_from_row).transpose()? else {
            return Ok(None);
        };

        let account = self
            .get_account(company_id, transaction.account_id)
            .await?
            .ok_or_else(|| StoreError::Internal(format!("account {} vanished", transaction.account_id)))?;
        let category = match transaction.category_id {
            Some(category_id) => self.get_category(company_id, category_id).await?,
            None => None,
        };

        Ok(Some(TransactionDetail {
            transaction,
            account,
            category,
        }))
    }

    #[instrument(skip(self, new), fields(company_id = %company_id), err)]
    async fn create_transaction(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        new: NewTransaction,
    ) -> StoreResult<FinancialTransaction> {
        let amount = positive_amount(new.amount)?;
        let mut tx = self.begin("create_transaction").await?;
        check_refs(&mut tx, company_id, new.account_id, new.category_id).await?;

        let row = sqlx::query(
            r#"
            INSERT INTO zenit.financial_transaction
                (company_id, account_id, category_id, user_id, description, amount, date, type, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(company_id.get())
        .bind(new.account_id.get())
        .bind(new.category_id.map(|c| c.get()))
        .bind(user_id.get())
        .bind(&new.description)
        .bind(amount)
        .bind(new.date)
        .bind(new.transaction_type.as_str())
        .bind(new.status.as_str())
        .bind(new.notes.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_transaction", "", e))?;
        let transaction = transaction_from_row(&row)?;

        apply_adjustments(&mut tx, &plan_create(&transaction.state())).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "", e))?;
        Ok(transaction)
    }

    #[instrument(skip(self, patch), fields(company_id = %company_id, transaction_id = %id), err)]
    async fn update_transaction(
        &self,
        company_id: CompanyId,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> StoreResult<Option<FinancialTransaction>> {
        let mut tx = self.begin("update_transaction").await?;
        let Some(current) = lock_transaction(&mut tx, company_id, id).await? else {
            return Ok(None);
        };
        let next = patch.merged(&current)?;
        check_refs(&mut tx, company_id, next.account_id, next.category_id).await?;

        let row = sqlx::query(
            r#"
            UPDATE zenit.financial_transaction
            SET account_id = $3,
                category_id = $4,
                description = $5,
                amount = $6,
                date = $7,
                type = $8,
                status = $9,
                notes = $10,
                updated_at = now()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(company_id.get())
        .bind(next.account_id.get())
        .bind(next.category_id.map(|c| c.get()))
        .bind(&next.description)
        .bind(next.amount)
        .bind(next.date)
        .bind(next.transaction_type.as_str())
        .bind(next.status.as_str())
        .bind(next.notes.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_transaction", "", e))?;
        let updated = transaction_from_row(&row)?;

        apply_adjustments(&mut tx, &plan_update(&current.state(), &updated.state())).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "", e))?;
        Ok(Some(updated))
    }

    #[instrument(skip(self), fields(company_id = %company_id, transaction_id = %id), err)]
    async fn delete_transaction(&self, company_id: CompanyId, id: TransactionId) -> StoreResult<bool> {
        let mut tx = self.begin("delete_transaction").await?;
        let Some(current) = lock_transaction(&mut tx, company_id, id).await? else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM zenit.financial_transaction WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_transaction", "", e))?;

        apply_adjustments(&mut tx, &plan_delete(&current.state())).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "", e))?;
        Ok(true)
    }
}
