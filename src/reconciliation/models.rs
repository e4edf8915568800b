use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Pending,
    InProgress,
    Completed,
}

/// Daily comparison of expected collections against received funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub id: Uuid,
    pub recon_date: NaiveDate,

    #[serde(with = "rust_decimal::serde::float")]
    pub total_expected: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub total_received: Decimal,

    pub matched_count: u32,
    pub unmatched_count: u32,

    #[serde(with = "rust_decimal::serde::float")]
    pub discrepancy_amount: Decimal,

    pub status: ReconciliationStatus,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One member's mismatch between expected and received funds. Closed only
/// by an explicit operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub id: Uuid,
    pub reconciliation_id: Uuid,
    pub member_id: Uuid,

    #[serde(with = "rust_decimal::serde::float")]
    pub expected_amount: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub received_amount: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub difference: Decimal,

    pub reason: String,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub notes: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Direction of a bank statement line. Removes sign ambiguity from amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// One line from a bank statement, input to statement-based matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLine {
    pub reference: Option<String>,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    pub direction: Direction,
    pub value_date: NaiveDate,
    pub description: String,
}

/// Certainty tier assigned when matching a statement line to a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Exact,
    Probable,
    Possible,
    None,
}

/// A completed payment a statement line can be matched against.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub reference: Option<String>,
    pub amount: Decimal,
    pub date: NaiveDate,
}

/// Outcome of matching one statement line.
#[derive(Debug, Clone, Serialize)]
pub struct StatementMatch {
    pub line: StatementLine,
    pub confidence: MatchConfidence,
    pub matched_payment_id: Option<Uuid>,
    pub reason: Option<String>,
}
