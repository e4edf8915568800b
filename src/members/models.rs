use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Debit-order standing of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebitOrderStatus {
    Active,
    Pending,
    Suspended,
    Failed,
}

/// Member roster entry. Owned by the policy-administration system;
/// read-only here apart from the arrears balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub member_number: String,
    pub full_name: String,
    pub email: String,
    pub bank_name: String,
    pub account_holder: String,
    pub account_number: String,
    pub branch_code: String,

    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_premium: Decimal,

    pub broker_group: String,
    pub debit_order_status: DebitOrderStatus,
    pub next_debit_date: NaiveDate,

    #[serde(with = "rust_decimal::serde::float")]
    pub arrears_balance: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
