use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use zenit_core::{AccountId, CategoryId, DomainError, DomainResult};

// -------------------------
// Request DTOs
// -------------------------

/// `/:id`, also when nested under `/companies/:companyId`.
#[derive(Debug, Deserialize)]
pub struct IdParam {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub balance: Option<Decimal>,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    /// Only present to be refused; balances move through transactions.
    pub balance: Option<Value>,
    #[serde(default, deserialize_with = "zenit_http::validate::double_option")]
    pub account_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "zenit_http::validate::double_option")]
    pub bank_name: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub category_type: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub category_type: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    #[serde(rename = "type")]
    pub category_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub status: Option<String>,
    pub account_id: Option<AccountId>,
    pub category_id: Option<CategoryId>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransactionRequest {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub status: Option<String>,
    pub account_id: Option<AccountId>,
    /// `null` detaches the category.
    #[serde(default, deserialize_with = "zenit_http::validate::double_option")]
    pub category_id: Option<Option<CategoryId>>,
    #[serde(default, deserialize_with = "zenit_http::validate::double_option")]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub account_id: Option<String>,
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub status: Option<String>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub use zenit_http::validate::{non_empty, required};

/// Query values: empty means "not filtered".
pub fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse an optional enum value from its text form.
pub fn parse_opt<T>(value: Option<String>) -> DomainResult<Option<T>>
where
    T: core::str::FromStr<Err = DomainError>,
{
    present(value).map(|v| v.parse()).transpose()
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_date(field: &str, raw: &str) -> DomainResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| DomainError::validation(format!("invalid {field}")))
}

/// End-of-day bound for bare dates, so `endDate=2024-05-31` includes the 31st.
pub fn parse_end_date(field: &str, raw: &str) -> DomainResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| DomainError::validation(format!("invalid {field}")));
    }
    parse_date(field, raw)
}
