use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::error::AppResult;
use crate::ledger::models::TransactionStatus;
use crate::ledger::repository::TransactionFilter;
use crate::ledger::LedgerRepository;
use crate::reconciliation::models::{
    Discrepancy, PaymentRecord, Reconciliation, ReconciliationStatus, StatementLine, StatementMatch,
};
use crate::reconciliation::repository::ReconciliationRepository;
use crate::reconciliation::statement::match_statement;

/// Cross-checks transaction outcomes against settlement data and drives
/// the discrepancy workflow.
pub struct ReconciliationEngine {
    ledger: Arc<LedgerRepository>,
    repo: Arc<ReconciliationRepository>,
    audit: Arc<AuditLog>,
}

impl ReconciliationEngine {
    pub fn new(
        ledger: Arc<LedgerRepository>,
        repo: Arc<ReconciliationRepository>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            ledger,
            repo,
            audit,
        }
    }

    /// Reconciles one calendar date of transactions: totals, counts, one
    /// discrepancy per failed transaction. Guarded against duplicates for
    /// the same date.
    pub async fn run_reconciliation(
        &self,
        date: NaiveDate,
        performed_by: &str,
    ) -> AppResult<Reconciliation> {
        let transactions = self
            .ledger
            .list_transactions(&TransactionFilter {
                date: Some(date),
                ..Default::default()
            })
            .await?;

        let total_expected: Decimal = transactions
            .iter()
            .filter(|t| t.status != TransactionStatus::Reversed)
            .map(|t| t.amount)
            .sum();
        let total_received: Decimal = transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Successful)
            .map(|t| t.amount)
            .sum();
        let matched_count = transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Successful)
            .count() as u32;
        let failed: Vec<_> = transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Failed)
            .collect();

        let reconciliation = self
            .repo
            .create_guarded(Reconciliation {
                id: Uuid::new_v4(),
                recon_date: date,
                total_expected,
                total_received,
                matched_count,
                unmatched_count: failed.len() as u32,
                discrepancy_amount: total_expected - total_received,
                status: ReconciliationStatus::InProgress,
                performed_by: performed_by.to_string(),
                created_at: Utc::now(),
                completed_at: None,
            })
            .await?;

        for tx in &failed {
            self.repo
                .create_discrepancy(Discrepancy {
                    id: Uuid::new_v4(),
                    reconciliation_id: reconciliation.id,
                    member_id: tx.member_id,
                    expected_amount: tx.amount,
                    received_amount: Decimal::ZERO,
                    difference: tx.amount,
                    reason: tx
                        .failure_reason
                        .clone()
                        .unwrap_or_else(|| "collection failed".to_string()),
                    resolved: false,
                    resolution: None,
                    notes: None,
                    resolved_by: None,
                    created_at: Utc::now(),
                    resolved_at: None,
                })
                .await?;
        }

        let completed = self
            .repo
            .set_status(reconciliation.id, ReconciliationStatus::Completed)
            .await?;

        self.audit
            .record(
                performed_by,
                "reconciliation_completed",
                "reconciliation",
                &completed.id.to_string(),
                format!(
                    "date {}, expected {}, received {}, {} discrepancies",
                    date,
                    completed.total_expected,
                    completed.total_received,
                    failed.len()
                ),
            )
            .await;
        info!(
            date = %date,
            expected = %completed.total_expected,
            received = %completed.total_received,
            discrepancies = failed.len(),
            "Reconciliation completed"
        );

        Ok(completed)
    }

    pub async fn resolve_discrepancy(
        &self,
        id: Uuid,
        resolution: String,
        notes: Option<String>,
        resolved_by: &str,
    ) -> AppResult<Discrepancy> {
        let resolved = self
            .repo
            .resolve_discrepancy(id, resolution, notes, resolved_by.to_string())
            .await?;

        self.audit
            .record(
                resolved_by,
                "discrepancy_resolved",
                "discrepancy",
                &id.to_string(),
                resolved.resolution.clone().unwrap_or_default(),
            )
            .await;

        Ok(resolved)
    }

    /// Scheduled variant: reconciles yesterday, skipping quietly when a
    /// duplicate schedule already covered it.
    pub async fn auto_reconcile(&self) -> AppResult<Option<Reconciliation>> {
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        if self.repo.find_by_date(yesterday).await.is_some() {
            info!(date = %yesterday, "Reconciliation already exists, skipping");
            return Ok(None);
        }
        let reconciliation = self.run_reconciliation(yesterday, "scheduler").await?;
        Ok(Some(reconciliation))
    }

    /// Statement-based variant: matches bank-statement lines against the
    /// date's successful collections by confidence tier.
    pub async fn reconcile_statement(
        &self,
        date: NaiveDate,
        lines: &[StatementLine],
    ) -> AppResult<Vec<StatementMatch>> {
        let transactions = self
            .ledger
            .list_transactions(&TransactionFilter {
                date: Some(date),
                status: Some(TransactionStatus::Successful),
                ..Default::default()
            })
            .await?;

        let payments: Vec<PaymentRecord> = transactions
            .iter()
            .map(|t| PaymentRecord {
                id: t.id,
                reference: t.processor_ref.clone().or_else(|| Some(t.id.to_string())),
                amount: t.amount,
                date: t.created_at.date_naive(),
            })
            .collect();

        Ok(match_statement(lines, &payments))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::{AppError, ReconciliationError};
    use crate::ledger::models::{BatchType, Run, RunStatus, Transaction};
    use crate::reconciliation::models::Direction;

    struct Fixture {
        engine: ReconciliationEngine,
        ledger: Arc<LedgerRepository>,
        repo: Arc<ReconciliationRepository>,
        run_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(LedgerRepository::new());
        let repo = Arc::new(ReconciliationRepository::new());
        let audit = Arc::new(AuditLog::new());

        let run_id = Uuid::new_v4();
        ledger
            .create_run(Run {
                id: run_id,
                run_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                batch_name: "COL-20240304-test".to_string(),
                batch_type: BatchType::TwoDay,
                member_count: 0,
                total_amount: dec!(0),
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
            engine: ReconciliationEngine::new(ledger.clone(), repo.clone(), audit),
            ledger,
            repo,
            run_id,
        }
    }

    async fn transaction(
        f: &Fixture,
        status: TransactionStatus,
        amount: rust_decimal::Decimal,
        created_at: chrono::DateTime<Utc>,
        failure_reason: Option<&str>,
    ) -> Transaction {
        f.ledger
            .create_transaction(Transaction {
                id: Uuid::new_v4(),
                run_id: f.run_id,
                member_id: Uuid::new_v4(),
                amount,
                status,
                retry_count: 0,
                failure_reason: failure_reason.map(String::from),
                processor_ref: None,
                response_log: Vec::new(),
                created_at,
                updated_at: created_at,
                processed_at: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn totals_and_discrepancies_follow_transaction_outcomes() {
        let f = fixture().await;
        let now = Utc::now();
        let today = now.date_naive();

        transaction(&f, TransactionStatus::Successful, dec!(450), now, None).await;
        transaction(&f, TransactionStatus::Successful, dec!(300), now, None).await;
        transaction(&f, TransactionStatus::Failed, dec!(200), now, Some("insufficient funds")).await;
        transaction(&f, TransactionStatus::Reversed, dec!(100), now, None).await;

        let rec = f.engine.run_reconciliation(today, "ops").await.unwrap();

        assert_eq!(rec.total_expected, dec!(950));
        assert_eq!(rec.total_received, dec!(750));
        assert_eq!(rec.discrepancy_amount, rec.total_expected - rec.total_received);
        assert_eq!(rec.matched_count, 2);
        assert_eq!(rec.unmatched_count, 1);
        assert_eq!(rec.status, ReconciliationStatus::Completed);
        assert!(rec.completed_at.is_some());

        let discrepancies = f.repo.list_discrepancies(rec.id).await.unwrap();
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].expected_amount, dec!(200));
        assert_eq!(discrepancies[0].received_amount, dec!(0));
        assert_eq!(discrepancies[0].reason, "insufficient funds");
    }

    #[tokio::test]
    async fn second_reconciliation_for_same_date_is_rejected() {
        let f = fixture().await;
        let today = Utc::now().date_naive();
        transaction(&f, TransactionStatus::Successful, dec!(450), Utc::now(), None).await;

        f.engine.run_reconciliation(today, "ops").await.unwrap();
        let result = f.engine.run_reconciliation(today, "ops").await;
        assert!(matches!(
            result,
            Err(AppError::Reconciliation(ReconciliationError::AlreadyReconciled(_)))
        ));
    }

    #[tokio::test]
    async fn resolving_a_discrepancy_twice_fails() {
        let f = fixture().await;
        let today = Utc::now().date_naive();
        transaction(&f, TransactionStatus::Failed, dec!(200), Utc::now(), Some("declined")).await;

        let rec = f.engine.run_reconciliation(today, "ops").await.unwrap();
        let disc = f.repo.list_discrepancies(rec.id).await.unwrap().remove(0);

        let resolved = f
            .engine
            .resolve_discrepancy(disc.id, "member paid manually".to_string(), None, "ops")
            .await
            .unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("ops"));

        let again = f
            .engine
            .resolve_discrepancy(disc.id, "again".to_string(), None, "ops")
            .await;
        assert!(matches!(
            again,
            Err(AppError::Reconciliation(ReconciliationError::AlreadyResolved))
        ));
    }

    #[tokio::test]
    async fn auto_reconcile_skips_an_already_covered_date() {
        let f = fixture().await;
        let yesterday = Utc::now() - Duration::days(1);
        transaction(&f, TransactionStatus::Successful, dec!(450), yesterday, None).await;

        let first = f.engine.auto_reconcile().await.unwrap();
        assert!(first.is_some());

        let second = f.engine.auto_reconcile().await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn statement_matching_uses_successful_transactions() {
        let f = fixture().await;
        let now = Utc::now();
        let today = now.date_naive();

        let paid = transaction(&f, TransactionStatus::Successful, dec!(450), now, None).await;
        transaction(&f, TransactionStatus::Failed, dec!(200), now, Some("declined")).await;

        let lines = vec![StatementLine {
            reference: Some(paid.id.to_string()),
            amount: dec!(450),
            direction: Direction::Credit,
            value_date: today,
            description: "EFT CREDIT".to_string(),
        }];

        let matches = f.engine.reconcile_statement(today, &lines).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].confidence,
            crate::reconciliation::models::MatchConfidence::Exact
        );
        assert_eq!(matches[0].matched_payment_id, Some(paid.id));
    }
}
