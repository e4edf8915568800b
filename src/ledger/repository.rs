use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult, BatchError, TransactionError};
use crate::ledger::models::{
    Escalation, EscalationStatus, Run, RunStatus, Transaction, TransactionStatus, MAX_RETRIES,
};

/// Filter for transaction listings.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub run_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub date: Option<NaiveDate>,
}

/// Outcome of a status application: `changed` is false when the update was
/// an idempotent re-delivery of the current status.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub transaction: Transaction,
    pub changed: bool,
}

/// Central store for runs, transactions and escalations. All transition
/// guards run inside the write lock, so a scheduled retry sweep and an
/// operator retry cannot both move the same transaction forward.
pub struct LedgerRepository {
    runs: tokio::sync::RwLock<HashMap<Uuid, Run>>,
    transactions: tokio::sync::RwLock<HashMap<Uuid, Transaction>>,
    escalations: tokio::sync::RwLock<HashMap<Uuid, Escalation>>,
}

impl LedgerRepository {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(HashMap::new()),
            transactions: tokio::sync::RwLock::new(HashMap::new()),
            escalations: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    // ===== runs =====

    pub async fn create_run(&self, run: Run) -> AppResult<Run> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id, run.clone());
        Ok(run)
    }

    pub async fn get_run(&self, run_id: Uuid) -> AppResult<Run> {
        let runs = self.runs.read().await;
        runs.get(&run_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))
    }

    pub async fn find_run_by_batch_ref(&self, batch_ref: &str) -> AppResult<Run> {
        let runs = self.runs.read().await;
        runs.values()
            .find(|r| r.processor_batch_ref.as_deref() == Some(batch_ref))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Run with batch ref {} not found", batch_ref)))
    }

    pub async fn list_runs(&self) -> AppResult<Vec<Run>> {
        let runs = self.runs.read().await;
        let mut all: Vec<Run> = runs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// Submission succeeded: pending (or failed, on resubmit) -> submitted.
    pub async fn mark_run_submitted(&self, run_id: Uuid, batch_ref: String) -> AppResult<Run> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))?;

        if !matches!(run.status, RunStatus::Pending | RunStatus::Failed) {
            return Err(BatchError::InvalidState {
                current: run.status.to_string(),
                expected: "pending or failed".to_string(),
            }
            .into());
        }

        run.status = RunStatus::Submitted;
        run.processor_batch_ref = Some(batch_ref);
        run.error_message = None;
        run.submitted_at = Some(Utc::now());

        Ok(run.clone())
    }

    /// Submission failed: never leave a run pending after an attempt.
    pub async fn mark_run_failed(&self, run_id: Uuid, message: String) -> AppResult<Run> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))?;

        if run.status == RunStatus::Completed {
            return Err(BatchError::InvalidState {
                current: run.status.to_string(),
                expected: "pending or submitted".to_string(),
            }
            .into());
        }

        run.status = RunStatus::Failed;
        run.error_message = Some(message);

        Ok(run.clone())
    }

    /// Processor-driven run status update (webhook or poll). Idempotent on
    /// re-delivery of the current status.
    pub async fn apply_run_status(&self, run_id: Uuid, new_status: RunStatus) -> AppResult<Run> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| AppError::NotFound(format!("Run {} not found", run_id)))?;

        if run.status == new_status {
            return Ok(run.clone());
        }
        if !run.status.can_transition_to(new_status) {
            return Err(BatchError::InvalidState {
                current: run.status.to_string(),
                expected: new_status.to_string(),
            }
            .into());
        }

        run.status = new_status;
        if new_status == RunStatus::Completed {
            run.completed_at = Some(Utc::now());
        }

        Ok(run.clone())
    }

    // ===== transactions =====

    pub async fn create_transaction(&self, transaction: Transaction) -> AppResult<Transaction> {
        let mut txs = self.transactions.write().await;
        txs.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    pub async fn get_transaction(&self, tx_id: Uuid) -> AppResult<Transaction> {
        let txs = self.transactions.read().await;
        txs.get(&tx_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", tx_id)))
    }

    /// Resolve an external transaction reference: our own id (the account
    /// reference we put in the batch file) or a processor reference seen on
    /// an earlier update.
    pub async fn find_transaction_by_ref(&self, external_ref: &str) -> AppResult<Transaction> {
        if let Ok(id) = Uuid::parse_str(external_ref) {
            if let Ok(tx) = self.get_transaction(id).await {
                return Ok(tx);
            }
        }
        let txs = self.transactions.read().await;
        txs.values()
            .find(|t| t.processor_ref.as_deref() == Some(external_ref))
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction with ref {} not found", external_ref))
            })
    }

    pub async fn list_transactions(&self, filter: &TransactionFilter) -> AppResult<Vec<Transaction>> {
        let txs = self.transactions.read().await;
        let mut matching: Vec<Transaction> = txs
            .values()
            .filter(|t| filter.run_id.map_or(true, |id| t.run_id == id))
            .filter(|t| filter.member_id.map_or(true, |id| t.member_id == id))
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.date.map_or(true, |d| t.created_at.date_naive() == d))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    /// All failed transactions that still have retry budget.
    pub async fn list_failed_retryable(&self) -> AppResult<Vec<Transaction>> {
        let txs = self.transactions.read().await;
        let mut matching: Vec<Transaction> = txs
            .values()
            .filter(|t| t.status == TransactionStatus::Failed && t.retry_count < MAX_RETRIES)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    /// Guarded retry: only a failed transaction with budget left moves back
    /// to processing. The check and the mutation share one write lock.
    pub async fn begin_retry(&self, tx_id: Uuid) -> AppResult<Transaction> {
        let mut txs = self.transactions.write().await;
        let tx = txs
            .get_mut(&tx_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", tx_id)))?;

        if tx.status != TransactionStatus::Failed {
            return Err(TransactionError::InvalidStateForRetry(tx.status.to_string()).into());
        }
        if tx.retry_count >= MAX_RETRIES {
            return Err(TransactionError::MaxRetriesExceeded.into());
        }

        tx.retry_count += 1;
        tx.status = TransactionStatus::Processing;
        tx.updated_at = Utc::now();
        tx.response_log
            .push(format!("retry attempt {} initiated", tx.retry_count));

        Ok(tx.clone())
    }

    /// Processor-driven status application. Re-delivery of the current
    /// status is a no-op (`changed: false`); invalid transitions are
    /// rejected without mutation.
    pub async fn apply_status(
        &self,
        tx_id: Uuid,
        new_status: TransactionStatus,
        processor_ref: Option<String>,
        response: Option<String>,
        failure_reason: Option<String>,
    ) -> AppResult<StatusChange> {
        let mut txs = self.transactions.write().await;
        let tx = txs
            .get_mut(&tx_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", tx_id)))?;

        if tx.status == new_status {
            return Ok(StatusChange {
                transaction: tx.clone(),
                changed: false,
            });
        }

        if !tx.status.can_transition_to(new_status) {
            return Err(TransactionError::InvalidTransition {
                from: tx.status.to_string(),
                to: new_status.to_string(),
            }
            .into());
        }

        tx.status = new_status;
        tx.updated_at = Utc::now();
        if let Some(r) = processor_ref {
            tx.processor_ref = Some(r);
        }
        if let Some(r) = response {
            tx.response_log.push(r);
        }
        match new_status {
            TransactionStatus::Failed => {
                if let Some(reason) = failure_reason {
                    tx.failure_reason = Some(reason);
                }
                tx.processed_at = Some(Utc::now());
            }
            TransactionStatus::Successful => {
                tx.processed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(StatusChange {
            transaction: tx.clone(),
            changed: true,
        })
    }

    pub async fn append_response_log(&self, tx_id: Uuid, line: String) -> AppResult<()> {
        let mut txs = self.transactions.write().await;
        let tx = txs
            .get_mut(&tx_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", tx_id)))?;
        tx.response_log.push(line);
        tx.updated_at = Utc::now();
        Ok(())
    }

    // ===== escalations =====

    /// Creates an escalation unless the transaction already has an open one.
    /// Returns None when a duplicate was suppressed.
    pub async fn create_escalation_if_absent(
        &self,
        escalation: Escalation,
    ) -> AppResult<Option<Escalation>> {
        let mut escalations = self.escalations.write().await;
        let already_open = escalations.values().any(|e| {
            e.transaction_id == escalation.transaction_id && e.status == EscalationStatus::Pending
        });
        if already_open {
            return Ok(None);
        }
        escalations.insert(escalation.id, escalation.clone());
        Ok(Some(escalation))
    }

    pub async fn list_escalations(&self) -> AppResult<Vec<Escalation>> {
        let escalations = self.escalations.read().await;
        let mut all: Vec<Escalation> = escalations.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
