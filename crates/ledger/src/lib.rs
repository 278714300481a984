//! Ledger module (account balances driven by financial transactions).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. Stores
//! apply the planned adjustments inside their own unit of work.

pub mod balance;
pub mod kinds;

pub use balance::{
    BalanceAdjustment, TransactionState, plan_create, plan_delete, plan_update, signed_effect,
};
pub use kinds::{CategoryType, TransactionStatus, TransactionType};
