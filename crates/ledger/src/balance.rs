use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use zenit_core::AccountId;

use crate::{TransactionStatus, TransactionType};

/// The fields of a transaction that affect an account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionState {
    pub account_id: AccountId,
    /// Always positive; the sign comes from `kind`.
    pub amount: Decimal,
    pub kind: TransactionType,
    pub status: TransactionStatus,
}

impl TransactionState {
    /// True when switching from `self` to `other` may move money.
    pub fn affects_balance_differently(&self, other: &TransactionState) -> bool {
        self.account_id != other.account_id
            || self.amount != other.amount
            || self.kind != other.kind
            || self.status != other.status
    }
}

/// Signed change to apply to one account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAdjustment {
    pub account_id: AccountId,
    pub delta: Decimal,
}

/// Balance effect of a transaction. Only completed transactions count.
///
/// Income credits the account; expense and transfer debit it.
pub fn signed_effect(state: &TransactionState) -> Option<BalanceAdjustment> {
    if state.status != TransactionStatus::Completed {
        return None;
    }

    let delta = match state.kind {
        TransactionType::Income => state.amount,
        TransactionType::Expense | TransactionType::Transfer => -state.amount,
    };

    Some(BalanceAdjustment {
        account_id: state.account_id,
        delta,
    })
}

pub fn plan_create(new: &TransactionState) -> Vec<BalanceAdjustment> {
    signed_effect(new).into_iter().collect()
}

/// Reverse the original effect and apply the new one, netted per account.
///
/// Returns nothing when none of the balance-relevant fields changed.
pub fn plan_update(old: &TransactionState, new: &TransactionState) -> Vec<BalanceAdjustment> {
    if !old.affects_balance_differently(new) {
        return Vec::new();
    }

    let reversal = signed_effect(old).map(|a| BalanceAdjustment {
        account_id: a.account_id,
        delta: -a.delta,
    });

    let mut out: Vec<BalanceAdjustment> = Vec::with_capacity(2);
    for adj in reversal.into_iter().chain(signed_effect(new)) {
        match out.iter_mut().find(|a| a.account_id == adj.account_id) {
            Some(existing) => existing.delta += adj.delta,
            None => out.push(adj),
        }
    }

    out.retain(|a| !a.delta.is_zero());
    out
}

pub fn plan_delete(old: &TransactionState) -> Vec<BalanceAdjustment> {
    signed_effect(old)
        .map(|a| BalanceAdjustment {
            account_id: a.account_id,
            delta: -a.delta,
        })
        .into_iter()
        .collect()
}
