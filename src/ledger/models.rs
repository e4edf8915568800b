use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use std::fmt;

/// Automatic retry budget per transaction.
pub const MAX_RETRIES: u8 = 3;

/// Instruction class for a collection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchType {
    SameDay,
    TwoDay,
}

impl BatchType {
    /// Instruction token the processor expects in the header record.
    pub fn instruction(&self) -> &'static str {
        match self {
            BatchType::SameDay => "SAMEDAY",
            BatchType::TwoDay => "TWO DAY",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::SameDay => "same_day",
            BatchType::TwoDay => "two_day",
        }
    }
}

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Submitted,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Submitted => "submitted",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Forward-only transitions driven by processor signals. Resubmission
    /// of a failed run goes through the submit operation, not this check.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Submitted, Completed)
                | (Submitted, Failed)
        )
    }
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Successful,
    Failed,
    Reversed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reversed => "reversed",
        }
    }

    /// Forward-only transitions for status updates arriving from the
    /// processor (webhook or poll). Failed -> Processing is reserved for
    /// the retry operation and is not a valid external transition.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Successful)
                | (Pending, Failed)
                | (Pending, Reversed)
                | (Processing, Successful)
                | (Processing, Failed)
                | (Processing, Reversed)
                | (Successful, Reversed)
        )
    }
}

/// Maps the processor's transaction status vocabulary onto ours.
/// Case-insensitive; unknown values stay pending.
pub fn map_processor_status(external: &str) -> TransactionStatus {
    match external.trim().to_uppercase().as_str() {
        "APPROVED" | "SUCCESS" | "SUCCESSFUL" => TransactionStatus::Successful,
        "DECLINED" | "FAILED" | "REJECTED" => TransactionStatus::Failed,
        "REVERSED" => TransactionStatus::Reversed,
        "PROCESSING" => TransactionStatus::Processing,
        _ => TransactionStatus::Pending,
    }
}

/// Batch-level variant of the same vocabulary. PROCESSING means the batch
/// has been accepted and is in flight, which for a run is `Submitted`.
pub fn map_processor_batch_status(external: &str) -> RunStatus {
    match external.trim().to_uppercase().as_str() {
        "APPROVED" | "SUCCESS" | "SUCCESSFUL" | "COMPLETED" | "COMPLETE" => RunStatus::Completed,
        "DECLINED" | "FAILED" | "REJECTED" => RunStatus::Failed,
        "PROCESSING" => RunStatus::Submitted,
        _ => RunStatus::Pending,
    }
}

/// One generated batch file plus its set of transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub run_date: NaiveDate,
    pub batch_name: String,
    pub batch_type: BatchType,
    pub member_count: u32,

    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,

    pub file_path: String,
    pub status: RunStatus,
    pub processor_batch_ref: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One member's collection within a run. Amount is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub run_id: Uuid,
    pub member_id: Uuid,

    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    pub status: TransactionStatus,
    pub retry_count: u8,
    pub failure_reason: Option<String>,
    pub processor_ref: Option<String>,
    pub response_log: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Pending,
    Resolved,
}

/// Manual-review case raised when a transaction exhausts its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub member_id: Uuid,
    pub reason: String,
    pub assigned_to: Option<String>,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
