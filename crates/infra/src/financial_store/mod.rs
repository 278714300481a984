//! Financial accounts, categories and transactions (financial service storage).
//!
//! Every method is scoped to one company. Transaction writes and the balance
//! adjustments planned by `zenit_ledger` commit together or not at all.

mod memory;
mod postgres;

pub use memory::InMemoryFinancialStore;
pub use postgres::PostgresFinancialStore;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use zenit_core::{AccountId, CategoryId, CompanyId, TransactionId, UserId};
use zenit_ledger::{CategoryType, TransactionState, TransactionStatus, TransactionType};

use crate::error::{StoreError, StoreResult};

pub const DEFAULT_CATEGORY_COLOR: &str = "#3B82F6";

pub(crate) const ACCOUNT_IN_USE: &str = "cannot delete account with linked transactions";
pub(crate) const CATEGORY_IN_USE: &str = "cannot delete category with linked transactions";
pub(crate) const UNKNOWN_ACCOUNT: &str = "account not found for this company";
pub(crate) const UNKNOWN_CATEGORY: &str = "category not found for this company";

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialAccount {
    pub id: AccountId,
    pub company_id: CompanyId,
    pub user_id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub balance: Decimal,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub account_type: String,
    /// Opening balance.
    pub balance: Decimal,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub is_active: bool,
}

/// `Some(None)` clears an optional column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub account_type: Option<String>,
    pub account_number: Option<Option<String>>,
    pub bank_name: Option<Option<String>>,
    pub is_active: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialCategory {
    pub id: CategoryId,
    pub company_id: CompanyId,
    pub name: String,
    #[serde(rename = "type")]
    pub category_type: CategoryType,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub category_type: CategoryType,
    /// Falls back to [`DEFAULT_CATEGORY_COLOR`].
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub category_type: Option<CategoryType>,
    pub color: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTransaction {
    pub id: TransactionId,
    pub company_id: CompanyId,
    pub account_id: AccountId,
    pub category_id: Option<CategoryId>,
    pub user_id: UserId,
    pub description: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinancialTransaction {
    pub fn state(&self) -> TransactionState {
        TransactionState {
            account_id: self.account_id,
            amount: self.amount,
            kind: self.transaction_type,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub category_id: Option<CategoryId>,
    pub description: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPatch {
    pub account_id: Option<AccountId>,
    pub category_id: Option<Option<CategoryId>>,
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub date: Option<DateTime<Utc>>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub notes: Option<Option<String>>,
}

impl TransactionPatch {
    /// Apply the patch on top of `current`, producing the would-be row.
    pub(crate) fn merged(&self, current: &FinancialTransaction) -> StoreResult<FinancialTransaction> {
        let mut next = current.clone();
        if let Some(account_id) = self.account_id {
            next.account_id = account_id;
        }
        if let Some(category_id) = self.category_id {
            next.category_id = category_id;
        }
        if let Some(description) = &self.description {
            next.description = description.clone();
        }
        if let Some(amount) = self.amount {
            next.amount = positive_amount(amount)?;
        }
        if let Some(date) = self.date {
            next.date = date;
        }
        if let Some(kind) = self.transaction_type {
            next.transaction_type = kind;
        }
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(notes) = &self.notes {
            next.notes = notes.clone();
        }
        Ok(next)
    }
}

/// List filters. Dates are inclusive bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub account_id: Option<AccountId>,
    pub category_id: Option<CategoryId>,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub(crate) fn matches(&self, t: &FinancialTransaction) -> bool {
        self.start_date.is_none_or(|d| t.date >= d)
            && self.end_date.is_none_or(|d| t.date <= d)
            && self.account_id.is_none_or(|a| t.account_id == a)
            && self.category_id.is_none_or(|c| t.category_id == Some(c))
            && self.transaction_type.is_none_or(|k| t.transaction_type == k)
            && self.status.is_none_or(|s| t.status == s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    pub id: AccountId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
}

/// A listed transaction with the names needed to display it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListItem {
    #[serde(flatten)]
    pub transaction: FinancialTransaction,
    pub account: AccountRef,
    pub category: Option<CategoryRef>,
}

/// A single transaction with its account and category embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: FinancialTransaction,
    pub account: FinancialAccount,
    pub category: Option<FinancialCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    pub category_type: Option<CategoryType>,
}

#[async_trait::async_trait]
pub trait FinancialStore: Send + Sync {
    /// Ordered by name.
    async fn list_accounts(&self, company_id: CompanyId) -> StoreResult<Vec<FinancialAccount>>;

    async fn get_account(&self, company_id: CompanyId, id: AccountId) -> StoreResult<Option<FinancialAccount>>;

    async fn create_account(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        new: NewAccount,
    ) -> StoreResult<FinancialAccount>;

    async fn update_account(
        &self,
        company_id: CompanyId,
        id: AccountId,
        patch: AccountPatch,
    ) -> StoreResult<Option<FinancialAccount>>;

    /// `Referential` while transactions reference the account.
    async fn delete_account(&self, company_id: CompanyId, id: AccountId) -> StoreResult<bool>;

    /// Ordered by name.
    async fn list_categories(
        &self,
        company_id: CompanyId,
        filter: CategoryFilter,
    ) -> StoreResult<Vec<FinancialCategory>>;

    async fn get_category(&self, company_id: CompanyId, id: CategoryId) -> StoreResult<Option<FinancialCategory>>;

    async fn create_category(&self, company_id: CompanyId, new: NewCategory) -> StoreResult<FinancialCategory>;

    async fn update_category(
        &self,
        company_id: CompanyId,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> StoreResult<Option<FinancialCategory>>;

    /// `Referential` while transactions reference the category.
    async fn delete_category(&self, company_id: CompanyId, id: CategoryId) -> StoreResult<bool>;

    /// Ordered by date, newest first.
    async fn list_transactions(
        &self,
        company_id: CompanyId,
        filter: TransactionFilter,
    ) -> StoreResult<Vec<TransactionListItem>>;

    async fn get_transaction(
        &self,
        company_id: CompanyId,
        id: TransactionId,
    ) -> StoreResult<Option<TransactionDetail>>;

    /// Insert and apply the balance effect atomically.
    async fn create_transaction(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        new: NewTransaction,
    ) -> StoreResult<FinancialTransaction>;

    /// Update and re-balance atomically.
    async fn update_transaction(
        &self,
        company_id: CompanyId,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> StoreResult<Option<FinancialTransaction>>;

    /// Delete and reverse the balance effect atomically.
    async fn delete_transaction(&self, company_id: CompanyId, id: TransactionId) -> StoreResult<bool>;
}

/// Normalize a monetary amount to two decimal places, rounding half away
/// from zero like Postgres `NUMERIC(18, 2)`.
pub(crate) fn money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

pub(crate) fn positive_amount(value: Decimal) -> StoreResult<Decimal> {
    let amount = money(value);
    if amount <= Decimal::ZERO {
        return Err(StoreError::validation("amount must be greater than zero"));
    }
    Ok(amount)
}
