use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::batch::generator::ValidationFailure;
use crate::ledger::models::{BatchType, Run, Transaction, TransactionStatus};
use crate::members::models::DebitOrderStatus;
use crate::reconciliation::models::StatementLine;

// ========== REQUEST MODELS ==========

fn default_false() -> bool {
    false
}

/// Request to generate a collection batch for an action date
#[derive(Debug, Deserialize)]
pub struct GenerateBatchRequest {
    pub action_date: NaiveDate,
    pub batch_type: Option<BatchType>,
    pub broker_groups: Option<Vec<String>>,

    #[serde(default = "default_false")]
    pub auto_submit: bool,
}

/// Request to escalate a transaction for manual review
#[derive(Debug, Deserialize, Validate)]
pub struct EscalateRequest {
    #[validate(length(min = 1, message = "reason is required"))]
    pub reason: String,
    pub assigned_to: Option<String>,
}

/// Request to run reconciliation for a date
#[derive(Debug, Deserialize, Validate)]
pub struct RunReconciliationRequest {
    pub date: NaiveDate,

    #[validate(length(min = 1, message = "performed_by is required"))]
    pub performed_by: String,
}

/// Request to resolve a discrepancy
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveDiscrepancyRequest {
    #[validate(length(min = 1, message = "resolution is required"))]
    pub resolution: String,
    pub notes: Option<String>,

    #[validate(length(min = 1, message = "resolved_by is required"))]
    pub resolved_by: String,
}

/// Request to match bank-statement lines against a date's collections
#[derive(Debug, Deserialize)]
pub struct StatementReconciliationRequest {
    pub date: NaiveDate,
    pub lines: Vec<StatementLine>,
}

/// One roster entry pushed in by the policy-administration system
#[derive(Debug, Deserialize, Validate)]
pub struct MemberImport {
    #[validate(length(min = 1, message = "member_number is required"))]
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
}

#[derive(Debug, Deserialize)]
pub struct LoadMembersRequest {
    pub members: Vec<MemberImport>,
}

/// Optional date for the submission-due listing (defaults to today)
#[derive(Debug, Deserialize, Default)]
pub struct DueQuery {
    pub date: Option<NaiveDate>,
}

/// Business days ahead for the collection-date helper (defaults to 2)
#[derive(Debug, Deserialize, Default)]
pub struct CollectionDateQuery {
    pub days_ahead: Option<u32>,
}

/// Next valid collection date and the submission date it implies
#[derive(Debug, Serialize)]
pub struct CollectionDateResponse {
    pub strike_date: NaiveDate,
    pub submission_date: NaiveDate,
}

/// Transaction listing filters
#[derive(Debug, Deserialize, Default)]
pub struct TransactionQuery {
    pub run_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub date: Option<NaiveDate>,
}

// ========== RESPONSE MODELS ==========

/// Run summary returned from generation and submission
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub batch_name: String,
    pub batch_type: String,
    pub member_count: u32,
    pub total_amount: String,
    pub file_path: String,
    pub status: String,
    pub processor_batch_ref: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Run> for RunResponse {
    fn from(run: Run) -> Self {
        Self {
            run_id: run.id,
            run_date: run.run_date,
            batch_name: run.batch_name,
            batch_type: run.batch_type.as_str().to_string(),
            member_count: run.member_count,
            total_amount: run.total_amount.to_string(),
            file_path: run.file_path,
            status: run.status.to_string(),
            processor_batch_ref: run.processor_batch_ref,
            error_message: run.error_message,
            created_at: run.created_at,
            submitted_at: run.submitted_at,
            completed_at: run.completed_at,
        }
    }
}

/// Generation result: the run plus the members excluded by validation
#[derive(Debug, Serialize)]
pub struct BatchSummaryResponse {
    #[serde(flatten)]
    pub run: RunResponse,
    pub validation_errors: Vec<ValidationFailure>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: Uuid,
    pub run_id: Uuid,
    pub member_id: Uuid,
    pub amount: String,
    pub status: String,
    pub retry_count: u8,
    pub failure_reason: Option<String>,
    pub processor_ref: Option<String>,
    pub response_log: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            run_id: tx.run_id,
            member_id: tx.member_id,
            amount: tx.amount.to_string(),
            status: tx.status.to_string(),
            retry_count: tx.retry_count,
            failure_reason: tx.failure_reason,
            processor_ref: tx.processor_ref,
            response_log: tx.response_log,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
            processed_at: tx.processed_at,
        }
    }
}

/// Webhook ingestion acknowledgement
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub log_id: Uuid,
    pub processed: bool,
}

/// Escalation outcome; `created` is false when an open escalation already
/// covered the transaction
#[derive(Debug, Serialize)]
pub struct EscalateResponse {
    pub created: bool,
    pub escalation_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoadMembersResponse {
    pub loaded: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}
