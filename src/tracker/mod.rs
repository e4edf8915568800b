use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::error::AppResult;
use crate::ledger::models::{
    Escalation, EscalationStatus, Transaction, TransactionStatus, MAX_RETRIES,
};
use crate::ledger::LedgerRepository;
use crate::members::MemberRepository;

/// Aggregated result of an automatic retry sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrySweep {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub escalated: u32,
    pub errors: Vec<String>,
}

/// Owns the per-transaction lifecycle. Both delivery channels (webhook push
/// and explicit poll) funnel through `update_status`; neither mutates
/// transaction state directly.
pub struct TransactionTracker {
    ledger: Arc<LedgerRepository>,
    members: Arc<MemberRepository>,
    audit: Arc<AuditLog>,
}

impl TransactionTracker {
    pub fn new(
        ledger: Arc<LedgerRepository>,
        members: Arc<MemberRepository>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            ledger,
            members,
            audit,
        }
    }

    /// Operator or scheduled retry of a failed transaction. The repository
    /// guard rejects concurrent double-retries.
    pub async fn retry(&self, tx_id: Uuid, actor: &str) -> AppResult<Transaction> {
        let tx = self.ledger.begin_retry(tx_id).await?;
        self.audit
            .record(
                actor,
                "transaction_retry",
                "transaction",
                &tx_id.to_string(),
                format!("retry attempt {}", tx.retry_count),
            )
            .await;
        info!(tx_id = %tx_id, attempt = tx.retry_count, "Transaction retry initiated");
        Ok(tx)
    }

    /// Single entry point for outcome delivery. Idempotent: re-applying the
    /// current terminal status changes nothing and repeats no side effects.
    pub async fn update_status(
        &self,
        tx_id: Uuid,
        new_status: TransactionStatus,
        processor_ref: Option<String>,
        response: Option<String>,
        failure_reason: Option<String>,
    ) -> AppResult<Transaction> {
        let change = self
            .ledger
            .apply_status(tx_id, new_status, processor_ref, response, failure_reason)
            .await?;

        if !change.changed {
            return Ok(change.transaction);
        }
        let tx = &change.transaction;

        match new_status {
            TransactionStatus::Failed => {
                // first arrival at failed: the missed premium goes to arrears
                self.members.adjust_arrears(tx.member_id, tx.amount).await?;
                self.audit
                    .record(
                        "system",
                        "transaction_failed",
                        "transaction",
                        &tx_id.to_string(),
                        tx.failure_reason.clone().unwrap_or_default(),
                    )
                    .await;

                if tx.retry_count >= MAX_RETRIES {
                    self.escalate(tx_id, "maximum retry attempts reached", None, "system")
                        .await?;
                }
            }
            TransactionStatus::Successful => {
                self.audit
                    .record(
                        "system",
                        "transaction_successful",
                        "transaction",
                        &tx_id.to_string(),
                        format!("amount {}", tx.amount),
                    )
                    .await;
            }
            TransactionStatus::Reversed => {
                self.audit
                    .record(
                        "system",
                        "transaction_reversed",
                        "transaction",
                        &tx_id.to_string(),
                        format!("amount {}", tx.amount),
                    )
                    .await;
            }
            _ => {}
        }

        Ok(change.transaction)
    }

    /// Scheduled sweep: retry every failed transaction with budget left,
    /// and make sure every exhausted one has an escalation. A single bad
    /// transaction never aborts the sweep.
    pub async fn auto_retry_all(&self) -> AppResult<RetrySweep> {
        let mut sweep = RetrySweep::default();

        let retryable = self.ledger.list_failed_retryable().await?;
        for tx in retryable {
            sweep.attempted += 1;
            match self.retry(tx.id, "scheduler").await {
                Ok(_) => sweep.succeeded += 1,
                Err(e) => {
                    sweep.failed += 1;
                    sweep.errors.push(format!("{}: {}", tx.id, e));
                    warn!(tx_id = %tx.id, "Scheduled retry failed: {}", e);
                }
            }
        }

        // exhausted transactions that are still failed get a manual-review case
        let exhausted = self
            .ledger
            .list_transactions(&crate::ledger::repository::TransactionFilter {
                status: Some(TransactionStatus::Failed),
                ..Default::default()
            })
            .await?;
        for tx in exhausted.iter().filter(|t| t.retry_count >= MAX_RETRIES) {
            match self
                .escalate(tx.id, "maximum retry attempts reached", None, "scheduler")
                .await
            {
                Ok(Some(_)) => sweep.escalated += 1,
                Ok(None) => {}
                Err(e) => {
                    sweep.errors.push(format!("{}: {}", tx.id, e));
                    error!(tx_id = %tx.id, "Escalation failed: {}", e);
                }
            }
        }

        info!(
            attempted = sweep.attempted,
            succeeded = sweep.succeeded,
            failed = sweep.failed,
            escalated = sweep.escalated,
            "Retry sweep completed"
        );
        Ok(sweep)
    }

    /// Raises a manual-review case. If the transaction already has an open
    /// escalation the reason is appended to its response log instead, so
    /// the caller never fails on a duplicate.
    pub async fn escalate(
        &self,
        tx_id: Uuid,
        reason: &str,
        assigned_to: Option<String>,
        actor: &str,
    ) -> AppResult<Option<Escalation>> {
        let tx = self.ledger.get_transaction(tx_id).await?;
        let member = self.members.get(tx.member_id).await?;

        let escalation = Escalation {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            member_id: tx.member_id,
            reason: reason.to_string(),
            assigned_to,
            status: EscalationStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };

        match self.ledger.create_escalation_if_absent(escalation).await? {
            Some(created) => {
                self.audit
                    .record(
                        actor,
                        "transaction_escalated",
                        "transaction",
                        &tx_id.to_string(),
                        format!("member {}: {}", member.member_number, reason),
                    )
                    .await;
                info!(tx_id = %tx_id, "Transaction escalated: {}", reason);
                Ok(Some(created))
            }
            None => {
                self.ledger
                    .append_response_log(tx_id, format!("escalation suppressed: {}", reason))
                    .await?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::{AppError, TransactionError};
    use crate::ledger::models::{BatchType, Run, RunStatus};
    use crate::members::models::{DebitOrderStatus, Member};

    struct Fixture {
        tracker: TransactionTracker,
        ledger: Arc<LedgerRepository>,
        members: Arc<MemberRepository>,
        member_id: Uuid,
        run_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(LedgerRepository::new());
        let members = Arc::new(MemberRepository::new());
        let audit = Arc::new(AuditLog::new());

        let member = members
            .upsert(Member {
                id: Uuid::new_v4(),
                member_number: "M001".to_string(),
                full_name: "Thandi Nkosi".to_string(),
                email: "thandi@example.com".to_string(),
                bank_name: "First National".to_string(),
                account_holder: "Thandi Nkosi".to_string(),
                account_number: "62000001".to_string(),
                branch_code: "250655".to_string(),
                monthly_premium: dec!(450),
                broker_group: "GRP-A".to_string(),
                debit_order_status: DebitOrderStatus::Active,
                next_debit_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                arrears_balance: Decimal::ZERO,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let run_id = Uuid::new_v4();
        ledger
            .create_run(Run {
                id: run_id,
                run_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                batch_name: "COL-20240304-test".to_string(),
                batch_type: BatchType::TwoDay,
                member_count: 1,
                total_amount: dec!(450),
                file_path: "/tmp/none.txt".to_string(),
                status: RunStatus::Submitted,
                processor_batch_ref: Some("24137".to_string()),
                error_message: None,
                created_at: Utc::now(),
                submitted_at: Some(Utc::now()),
                completed_at: None,
            })
            .await
            .unwrap();

        Fixture {
            tracker: TransactionTracker::new(ledger.clone(), members.clone(), audit),
            ledger,
            members,
            member_id: member.id,
            run_id,
        }
    }

    async fn transaction(f: &Fixture, status: TransactionStatus, retry_count: u8) -> Transaction {
        f.ledger
            .create_transaction(Transaction {
                id: Uuid::new_v4(),
                run_id: f.run_id,
                member_id: f.member_id,
                amount: dec!(450),
                status,
                retry_count,
                failure_reason: None,
                processor_ref: None,
                response_log: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                processed_at: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn retry_moves_failed_back_to_processing() {
        let f = fixture().await;
        let tx = transaction(&f, TransactionStatus::Failed, 0).await;

        let retried = f.tracker.retry(tx.id, "operator").await.unwrap();
        assert_eq!(retried.status, TransactionStatus::Processing);
        assert_eq!(retried.retry_count, 1);
    }

    #[tokio::test]
    async fn retry_past_the_cap_is_rejected_without_mutation() {
        let f = fixture().await;
        let tx = transaction(&f, TransactionStatus::Failed, 3).await;

        let result = f.tracker.retry(tx.id, "operator").await;
        assert!(matches!(
            result,
            Err(AppError::Transaction(TransactionError::MaxRetriesExceeded))
        ));

        let unchanged = f.ledger.get_transaction(tx.id).await.unwrap();
        assert_eq!(unchanged.status, TransactionStatus::Failed);
        assert_eq!(unchanged.retry_count, 3);
    }

    #[tokio::test]
    async fn retry_of_non_failed_transaction_is_rejected() {
        let f = fixture().await;
        let tx = transaction(&f, TransactionStatus::Processing, 0).await;

        let result = f.tracker.retry(tx.id, "operator").await;
        assert!(matches!(
            result,
            Err(AppError::Transaction(TransactionError::InvalidStateForRetry(_)))
        ));
    }

    #[tokio::test]
    async fn duplicate_terminal_update_is_a_noop() {
        let f = fixture().await;
        let tx = transaction(&f, TransactionStatus::Processing, 0).await;

        f.tracker
            .update_status(
                tx.id,
                TransactionStatus::Failed,
                Some("NC-1".to_string()),
                Some("DECLINED".to_string()),
                Some("insufficient funds".to_string()),
            )
            .await
            .unwrap();

        // same outcome delivered again via the second channel
        let second = f
            .tracker
            .update_status(
                tx.id,
                TransactionStatus::Failed,
                Some("NC-1".to_string()),
                Some("DECLINED".to_string()),
                Some("insufficient funds".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(second.status, TransactionStatus::Failed);

        // arrears adjusted exactly once
        let member = f.members.get(f.member_id).await.unwrap();
        assert_eq!(member.arrears_balance, dec!(450));
    }

    #[tokio::test]
    async fn exhausted_failure_escalates_exactly_once() {
        let f = fixture().await;
        // already used the whole retry budget, currently in flight
        let tx = transaction(&f, TransactionStatus::Processing, 3).await;

        f.tracker
            .update_status(tx.id, TransactionStatus::Failed, None, None, Some("declined".into()))
            .await
            .unwrap();
        // duplicate delivery
        f.tracker
            .update_status(tx.id, TransactionStatus::Failed, None, None, Some("declined".into()))
            .await
            .unwrap();

        let escalations = f.ledger.list_escalations().await.unwrap();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].reason, "maximum retry attempts reached");
    }

    #[tokio::test]
    async fn successful_update_stamps_processed_at() {
        let f = fixture().await;
        let tx = transaction(&f, TransactionStatus::Processing, 0).await;

        let updated = f
            .tracker
            .update_status(tx.id, TransactionStatus::Successful, Some("NC-9".into()), None, None)
            .await
            .unwrap();
        assert_eq!(updated.status, TransactionStatus::Successful);
        assert!(updated.processed_at.is_some());
        assert_eq!(updated.processor_ref.as_deref(), Some("NC-9"));
    }

    #[tokio::test]
    async fn update_cannot_move_terminal_state_backwards() {
        let f = fixture().await;
        let tx = transaction(&f, TransactionStatus::Successful, 0).await;

        let result = f
            .tracker
            .update_status(tx.id, TransactionStatus::Failed, None, None, None)
            .await;
        assert!(matches!(
            result,
            Err(AppError::Transaction(TransactionError::InvalidTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn sweep_retries_and_escalates_without_aborting() {
        let f = fixture().await;
        let retryable = transaction(&f, TransactionStatus::Failed, 1).await;
        let exhausted = transaction(&f, TransactionStatus::Failed, 3).await;
        transaction(&f, TransactionStatus::Successful, 0).await;

        let sweep = f.tracker.auto_retry_all().await.unwrap();
        assert_eq!(sweep.attempted, 1);
        assert_eq!(sweep.succeeded, 1);
        assert_eq!(sweep.failed, 0);
        assert_eq!(sweep.escalated, 1);

        let retried = f.ledger.get_transaction(retryable.id).await.unwrap();
        assert_eq!(retried.status, TransactionStatus::Processing);
        assert_eq!(retried.retry_count, 2);

        let still_failed = f.ledger.get_transaction(exhausted.id).await.unwrap();
        assert_eq!(still_failed.status, TransactionStatus::Failed);

        // second sweep does not escalate again
        let sweep2 = f.tracker.auto_retry_all().await.unwrap();
        assert_eq!(sweep2.escalated, 0);
        assert_eq!(f.ledger.list_escalations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_escalation_lands_in_response_log() {
        let f = fixture().await;
        let tx = transaction(&f, TransactionStatus::Failed, 3).await;

        let first = f
            .tracker
            .escalate(tx.id, "maximum retry attempts reached", None, "operator")
            .await
            .unwrap();
        assert!(first.is_some());

        let second = f
            .tracker
            .escalate(tx.id, "maximum retry attempts reached", None, "operator")
            .await
            .unwrap();
        assert!(second.is_none());

        let tx = f.ledger.get_transaction(tx.id).await.unwrap();
        assert!(tx
            .response_log
            .iter()
            .any(|l| l.contains("escalation suppressed")));
    }
}
