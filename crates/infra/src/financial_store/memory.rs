use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use zenit_core::{AccountId, CategoryId, CompanyId, TransactionId, UserId};
use zenit_ledger::{BalanceAdjustment, plan_create, plan_delete, plan_update};

use super::{
    ACCOUNT_IN_USE, AccountPatch, AccountRef, CATEGORY_IN_USE, CategoryFilter, CategoryPatch,
    CategoryRef, DEFAULT_CATEGORY_COLOR, FinancialAccount, FinancialCategory, FinancialStore,
    FinancialTransaction, NewAccount, NewCategory, NewTransaction, TransactionDetail,
    TransactionFilter, TransactionListItem, TransactionPatch, UNKNOWN_ACCOUNT, UNKNOWN_CATEGORY,
    money, positive_amount,
};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    accounts: BTreeMap<AccountId, FinancialAccount>,
    categories: BTreeMap<CategoryId, FinancialCategory>,
    transactions: BTreeMap<TransactionId, FinancialTransaction>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn account(&self, company_id: CompanyId, id: AccountId) -> Option<&FinancialAccount> {
        self.accounts.get(&id).filter(|a| a.company_id == company_id)
    }

    fn category(&self, company_id: CompanyId, id: CategoryId) -> Option<&FinancialCategory> {
        self.categories.get(&id).filter(|c| c.company_id == company_id)
    }

    fn transaction(&self, company_id: CompanyId, id: TransactionId) -> Option<&FinancialTransaction> {
        self.transactions.get(&id).filter(|t| t.company_id == company_id)
    }

    fn check_refs(
        &self,
        company_id: CompanyId,
        account_id: AccountId,
        category_id: Option<CategoryId>,
    ) -> StoreResult<()> {
        if self.account(company_id, account_id).is_none() {
            return Err(StoreError::validation(UNKNOWN_ACCOUNT));
        }
        if let Some(category_id) = category_id {
            if self.category(company_id, category_id).is_none() {
                return Err(StoreError::validation(UNKNOWN_CATEGORY));
            }
        }
        Ok(())
    }

    /// Every adjustment targets an account checked by `check_refs` in the same
    /// critical section, so the lookups cannot miss.
    fn apply(&mut self, plan: &[BalanceAdjustment]) -> StoreResult<()> {
        for adj in plan {
            let account = self
                .accounts
                .get_mut(&adj.account_id)
                .ok_or_else(|| StoreError::Internal(format!("account {} vanished", adj.account_id)))?;
            account.balance += adj.delta;
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    fn list_item(&self, t: &FinancialTransaction) -> TransactionListItem {
        let account_name = self
            .accounts
            .get(&t.account_id)
            .map(|a| a.name.clone())
            .unwrap_or_default();
        TransactionListItem {
            transaction: t.clone(),
            account: AccountRef {
                id: t.account_id,
                name: account_name,
            },
            category: t
                .category_id
                .and_then(|id| self.categories.get(&id))
                .map(|c| CategoryRef {
                    id: c.id,
                    name: c.name.clone(),
                    color: c.color.clone(),
                }),
        }
    }
}

/// In-memory financial store for tests/dev.
///
/// A single mutex guards all state; each method, including the ledger
/// adjustments, runs entirely inside one critical section.
#[derive(Debug, Default)]
pub struct InMemoryFinancialStore {
    inner: Mutex<State>,
}

impl InMemoryFinancialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.inner.lock().map_err(|_| StoreError::poisoned())?;
        f(&mut state)
    }
}

#[async_trait::async_trait]
impl FinancialStore for InMemoryFinancialStore {
    async fn list_accounts(&self, company_id: CompanyId) -> StoreResult<Vec<FinancialAccount>> {
        self.with_state(|s| {
            let mut out: Vec<FinancialAccount> = s
                .accounts
                .values()
                .filter(|a| a.company_id == company_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            Ok(out)
        })
    }

    async fn get_account(&self, company_id: CompanyId, id: AccountId) -> StoreResult<Option<FinancialAccount>> {
        self.with_state(|s| Ok(s.account(company_id, id).cloned()))
    }

    async fn create_account(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        new: NewAccount,
    ) -> StoreResult<FinancialAccount> {
        self.with_state(|s| {
            let now = Utc::now();
            let account = FinancialAccount {
                id: AccountId::new(s.next_id()),
                company_id,
                user_id,
                name: new.name,
                account_type: new.account_type,
                balance: money(new.balance),
                account_number: new.account_number,
                bank_name: new.bank_name,
                is_active: new.is_active,
                created_at: now,
                updated_at: now,
            };
            s.accounts.insert(account.id, account.clone());
            Ok(account)
        })
    }

    async fn update_account(
        &self,
        company_id: CompanyId,
        id: AccountId,
        patch: AccountPatch,
    ) -> StoreResult<Option<FinancialAccount>> {
        self.with_state(|s| {
            let Some(account) = s.accounts.get_mut(&id).filter(|a| a.company_id == company_id) else {
                return Ok(None);
            };
            if let Some(name) = patch.name {
                account.name = name;
            }
            if let Some(kind) = patch.account_type {
                account.account_type = kind;
            }
            if let Some(number) = patch.account_number {
                account.account_number = number;
            }
            if let Some(bank) = patch.bank_name {
                account.bank_name = bank;
            }
            if let Some(active) = patch.is_active {
                account.is_active = active;
            }
            account.updated_at = Utc::now();
            Ok(Some(account.clone()))
        })
    }

    async fn delete_account(&self, company_id: CompanyId, id: AccountId) -> StoreResult<bool> {
        self.with_state(|s| {
            if s.account(company_id, id).is_none() {
                return Ok(false);
            }
            if s.transactions.values().any(|t| t.account_id == id) {
                return Err(StoreError::referential(ACCOUNT_IN_USE));
            }
            s.accounts.remove(&id);
            Ok(true)
        })
    }

    async fn list_categories(
        &self,
        company_id: CompanyId,
        filter: CategoryFilter,
    ) -> StoreResult<Vec<FinancialCategory>> {
        self.with_state(|s| {
            let mut out: Vec<FinancialCategory> = s
                .categories
                .values()
                .filter(|c| c.company_id == company_id)
                .filter(|c| filter.category_type.is_none_or(|k| c.category_type == k))
                .cloned()
                .collect();
            out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            Ok(out)
        })
    }

    async fn get_category(&self, company_id: CompanyId, id: CategoryId) -> StoreResult<Option<FinancialCategory>> {
        self.with_state(|s| Ok(s.category(company_id, id).cloned()))
    }

    async fn create_category(&self, company_id: CompanyId, new: NewCategory) -> StoreResult<FinancialCategory> {
        self.with_state(|s| {
            let now = Utc::now();
            let category = FinancialCategory {
                id: CategoryId::new(s.next_id()),
                company_id,
                name: new.name,
                category_type: new.category_type,
                color: new.color.unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
                created_at: now,
                updated_at: now,
            };
            s.categories.insert(category.id, category.clone());
            Ok(category)
        })
    }

    async fn update_category(
        &self,
        company_id: CompanyId,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> StoreResult<Option<FinancialCategory>> {
        self.with_state(|s| {
            let Some(category) = s.categories.get_mut(&id).filter(|c| c.company_id == company_id) else {
                return Ok(None);
            };
            if let Some(name) = patch.name {
                category.name = name;
            }
            if let Some(kind) = patch.category_type {
                category.category_type = kind;
            }
            if let Some(color) = patch.color {
                category.color = color;
            }
            category.updated_at = Utc::now();
            Ok(Some(category.clone()))
        })
    }

    async fn delete_category(&self, company_id: CompanyId, id: CategoryId) -> StoreResult<bool> {
        self.with_state(|s| {
            if s.category(company_id, id).is_none() {
                return Ok(false);
            }
            if s.transactions.values().any(|t| t.category_id == Some(id)) {
                return Err(StoreError::referential(CATEGORY_IN_USE));
            }
            s.categories.remove(&id);
            Ok(true)
        })
    }

    async fn list_transactions(
        &self,
        company_id: CompanyId,
        filter: TransactionFilter,
    ) -> StoreResult<Vec<TransactionListItem>> {
        self.with_state(|s| {
            let mut rows: Vec<&FinancialTransaction> = s
                .transactions
                .values()
                .filter(|t| t.company_id == company_id && filter.matches(t))
                .collect();
            rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
            Ok(rows.into_iter().map(|t| s.list_item(t)).collect())
        })
    }

    async fn get_transaction(
        &self,
        company_id: CompanyId,
        id: TransactionId,
    ) -> StoreResult<Option<TransactionDetail>> {
        self.with_state(|s| {
            let Some(t) = s.transaction(company_id, id) else {
                return Ok(None);
            };
            let account = s
                .accounts
                .get(&t.account_id)
                .cloned()
                .ok_or_else(|| StoreError::Internal(format!("account {} vanished", t.account_id)))?;
            Ok(Some(TransactionDetail {
                transaction: t.clone(),
                account,
                category: t.category_id.and_then(|c| s.categories.get(&c)).cloned(),
            }))
        })
    }

    async fn create_transaction(
        &self,
        company_id: CompanyId,
        user_id: UserId,
        new: NewTransaction,
    ) -> StoreResult<FinancialTransaction> {
        self.with_state(|s| {
            let amount = positive_amount(new.amount)?;
            s.check_refs(company_id, new.account_id, new.category_id)?;

            let now = Utc::now();
            let transaction = FinancialTransaction {
                id: TransactionId::new(s.next_id()),
                company_id,
                account_id: new.account_id,
                category_id: new.category_id,
                user_id,
                description: new.description,
                amount,
                date: new.date,
                transaction_type: new.transaction_type,
                status: new.status,
                notes: new.notes,
                created_at: now,
                updated_at: now,
            };

            s.apply(&plan_create(&transaction.state()))?;
            s.transactions.insert(transaction.id, transaction.clone());
            Ok(transaction)
        })
    }

    async fn update_transaction(
        &self,
        company_id: CompanyId,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> StoreResult<Option<FinancialTransaction>> {
        self.with_state(|s| {
            let Some(current) = s.transaction(company_id, id).cloned() else {
                return Ok(None);
            };
            let mut next = patch.merged(&current)?;
            s.check_refs(company_id, next.account_id, next.category_id)?;

            s.apply(&plan_update(&current.state(), &next.state()))?;
            next.updated_at = Utc::now();
            s.transactions.insert(id, next.clone());
            Ok(Some(next))
        })
    }

    async fn delete_transaction(&self, company_id: CompanyId, id: TransactionId) -> StoreResult<bool> {
        self.with_state(|s| {
            let Some(current) = s.transaction(company_id, id).cloned() else {
                return Ok(false);
            };
            s.apply(&plan_delete(&current.state()))?;
            s.transactions.remove(&id);
            Ok(true)
        })
    }
}
