use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::batch::encoder::{encode_batch_file, BatchHeader, BatchRow};
use crate::error::{AppResult, BatchError};
use crate::ledger::models::{BatchType, Run, RunStatus, Transaction, TransactionStatus};
use crate::ledger::LedgerRepository;
use crate::members::models::Member;
use crate::members::MemberRepository;

/// Batch generation configuration, passed in at construction.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub service_key: String,
    pub vendor_key: String,
    pub batch_dir: String,
}

#[derive(Debug, Clone)]
pub struct GenerateBatchRequest {
    pub action_date: NaiveDate,
    pub batch_type: Option<BatchType>,
    pub broker_groups: Option<Vec<String>>,
}

/// A member excluded from the batch, with the reasons.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    pub member_number: String,
    pub errors: Vec<String>,
}

/// A strike date whose batch must go to the processor today.
#[derive(Debug, Clone, Serialize)]
pub struct DueStrikeDate {
    pub strike_date: NaiveDate,
    pub member_count: u32,
}

/// What the caller gets back: the run plus the non-fatal exclusions.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub run: Run,
    pub validation_failures: Vec<ValidationFailure>,
}

/// Required payment data for inclusion in a batch file.
pub fn validate_member(member: &Member) -> Vec<String> {
    let mut errors = Vec::new();

    if member.member_number.trim().is_empty() {
        errors.push("member number is required".to_string());
    }
    if member.full_name.trim().is_empty() {
        errors.push("member name is required".to_string());
    }
    if member.bank_name.trim().is_empty() {
        errors.push("bank name is required".to_string());
    }
    if member.account_number.trim().is_empty() {
        errors.push("account number is required".to_string());
    } else if member.account_number.len() > 15 {
        errors.push("account number exceeds 15 characters".to_string());
    }
    if member.branch_code.trim().is_empty() {
        errors.push("branch code is required".to_string());
    } else if member.branch_code.len() != 6 || !member.branch_code.chars().all(|c| c.is_ascii_digit())
    {
        errors.push("branch code must be exactly 6 digits".to_string());
    }
    if member.monthly_premium <= Decimal::ZERO {
        errors.push("premium must be positive".to_string());
    }

    errors
}

pub struct BatchGenerator {
    ledger: Arc<LedgerRepository>,
    members: Arc<MemberRepository>,
    audit: Arc<AuditLog>,
    config: BatchConfig,
}

impl BatchGenerator {
    pub fn new(
        ledger: Arc<LedgerRepository>,
        members: Arc<MemberRepository>,
        audit: Arc<AuditLog>,
        config: BatchConfig,
    ) -> Self {
        Self {
            ledger,
            members,
            audit,
            config,
        }
    }

    /// Strike dates requiring submission on `today`: weekend-adjusted
    /// member debit dates whose submission date lands on `today`, with the
    /// number of eligible members behind each.
    pub async fn due_for_submission(&self, today: NaiveDate) -> AppResult<Vec<DueStrikeDate>> {
        let eligible = self.members.list_eligible(None).await?;
        let mut counts: std::collections::BTreeMap<NaiveDate, u32> = std::collections::BTreeMap::new();
        for member in eligible {
            let strike = crate::scheduling::adjust_for_weekend(member.next_debit_date);
            if crate::scheduling::submission_date(strike) == today {
                *counts.entry(strike).or_insert(0) += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(strike_date, member_count)| DueStrikeDate {
                strike_date,
                member_count,
            })
            .collect())
    }

    /// Selects eligible members, validates their payment data, encodes the
    /// batch file and persists the run with one pending transaction per
    /// included member. Validation failures are reported, not fatal.
    pub async fn generate(&self, request: GenerateBatchRequest) -> AppResult<BatchSummary> {
        let batch_type = request.batch_type.unwrap_or(BatchType::TwoDay);
        let eligible = self
            .members
            .list_eligible(request.broker_groups.as_deref())
            .await?;

        let mut included: Vec<Member> = Vec::new();
        let mut validation_failures: Vec<ValidationFailure> = Vec::new();
        for member in eligible {
            let errors = validate_member(&member);
            if errors.is_empty() {
                included.push(member);
            } else {
                warn!(
                    member_number = %member.member_number,
                    "Excluding member from batch: {}",
                    errors.join("; ")
                );
                validation_failures.push(ValidationFailure {
                    member_number: member.member_number.clone(),
                    errors,
                });
            }
        }

        if included.is_empty() {
            return Err(BatchError::NoValidMembers.into());
        }

        let run_id = Uuid::new_v4();
        let batch_name = format!(
            "COL-{}-{}",
            request.action_date.format("%Y%m%d"),
            &run_id.simple().to_string()[..8]
        );

        // Transaction ids double as the file's account references, so an
        // outcome can be matched back without a processor-assigned ref.
        let tx_ids: Vec<Uuid> = included.iter().map(|_| Uuid::new_v4()).collect();
        let rows: Vec<BatchRow> = included
            .iter()
            .zip(tx_ids.iter())
            .map(|(member, tx_id)| BatchRow {
                account_ref: tx_id.to_string(),
                member,
            })
            .collect();

        let header = BatchHeader {
            service_key: &self.config.service_key,
            vendor_key: &self.config.vendor_key,
            instruction: batch_type.instruction(),
            batch_name: &batch_name,
            action_date: request.action_date,
        };
        let contents = encode_batch_file(&header, &rows);

        tokio::fs::create_dir_all(&self.config.batch_dir).await?;
        let file_path = Path::new(&self.config.batch_dir)
            .join(format!("{}.txt", batch_name))
            .to_string_lossy()
            .to_string();
        tokio::fs::write(&file_path, &contents).await?;

        let total_amount: Decimal = included.iter().map(|m| m.monthly_premium).sum();
        let now = Utc::now();
        let run = self
            .ledger
            .create_run(Run {
                id: run_id,
                run_date: request.action_date,
                batch_name: batch_name.clone(),
                batch_type,
                member_count: included.len() as u32,
                total_amount,
                file_path: file_path.clone(),
                status: RunStatus::Pending,
                processor_batch_ref: None,
                error_message: None,
                created_at: now,
                submitted_at: None,
                completed_at: None,
            })
            .await?;

        for (member, tx_id) in included.iter().zip(tx_ids.iter()) {
            self.ledger
                .create_transaction(Transaction {
                    id: *tx_id,
                    run_id,
                    member_id: member.id,
                    amount: member.monthly_premium,
                    status: TransactionStatus::Pending,
                    retry_count: 0,
                    failure_reason: None,
                    processor_ref: None,
                    response_log: Vec::new(),
                    created_at: now,
                    updated_at: now,
                    processed_at: None,
                })
                .await?;
        }

        self.audit
            .record(
                "system",
                "run_generated",
                "run",
                &run_id.to_string(),
                format!(
                    "batch {} with {} members, total {}",
                    batch_name,
                    run.member_count,
                    run.total_amount
                ),
            )
            .await;

        info!(
            run_id = %run_id,
            members = run.member_count,
            excluded = validation_failures.len(),
            "Batch generated: {}",
            batch_name
        );

        Ok(BatchSummary {
            run,
            validation_failures,
        })
    }
}
