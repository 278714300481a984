use serde::{Deserialize, Serialize};

use zenit_core::DomainError;

/// Direction of a financial transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
}

macro_rules! impl_text_enum {
    ($t:ty, $field:literal, [$($variant:path => $text:literal),+ $(,)?]) => {
        impl $t {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $text,)+
                }
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl core::str::FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($variant),)+
                    _ => Err(DomainError::validation(concat!("invalid ", $field))),
                }
            }
        }
    };
}

impl_text_enum!(TransactionType, "type", [
    TransactionType::Income => "income",
    TransactionType::Expense => "expense",
    TransactionType::Transfer => "transfer",
]);

impl_text_enum!(TransactionStatus, "status", [
    TransactionStatus::Pending => "pending",
    TransactionStatus::Completed => "completed",
    TransactionStatus::Cancelled => "cancelled",
]);

impl_text_enum!(CategoryType, "type", [
    CategoryType::Income => "income",
    CategoryType::Expense => "expense",
]);
