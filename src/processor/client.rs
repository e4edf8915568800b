use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::batch::encoder::validate_batch_file;
use crate::error::{AppResult, BatchError, ProcessorError};
use crate::ledger::models::{map_processor_batch_status, Run, RunStatus, TransactionStatus};
use crate::ledger::LedgerRepository;

/// External processor connection settings.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct SubmitBatchBody<'a> {
    service_key: &'a str,
    batch_name: &'a str,
    file_contents: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchStatusBody {
    status: String,
}

/// Thin transport client for the payment processor. Parsing of responses
/// is kept in pure functions so it is testable without a live endpoint.
pub struct ProcessorClient {
    http: reqwest::Client,
    config: ProcessorConfig,
}

impl ProcessorClient {
    pub fn new(config: ProcessorConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Transmits a batch file. Returns the processor's batch reference.
    pub async fn submit_batch(&self, batch_name: &str, file_contents: &str) -> AppResult<String> {
        let url = format!("{}/submit", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .json(&SubmitBatchBody {
                service_key: &self.config.service_key,
                batch_name,
                file_contents,
            })
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProcessorError::Transport(format!(
                "HTTP {} from processor",
                response.status()
            ))
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        Ok(parse_submit_response(&body)?)
    }

    /// Polls the processor for a batch's status. Returns the raw external
    /// status string; mapping onto our vocabulary is the caller's concern.
    pub async fn poll_batch_status(&self, batch_ref: &str) -> AppResult<String> {
        let url = format!(
            "{}/status/{}?service_key={}",
            self.config.base_url, batch_ref, self.config.service_key
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProcessorError::Transport(format!(
                "HTTP {} from processor",
                response.status()
            ))
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        // JSON {"status": "..."} or a bare status token
        if let Ok(parsed) = serde_json::from_str::<BatchStatusBody>(&body) {
            Ok(parsed.status)
        } else {
            Ok(body.trim().trim_matches('"').to_string())
        }
    }
}

/// A numeric body is the accepted batch reference; a body starting with a
/// negative error code is a rejection with the processor's message.
pub fn parse_submit_response(body: &str) -> Result<String, ProcessorError> {
    let trimmed = body.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return Err(ProcessorError::UnrecognisedResponse("empty body".to_string()));
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(trimmed.to_string());
    }
    if trimmed.starts_with('-') {
        return Err(ProcessorError::Rejected(trimmed.to_string()));
    }
    Err(ProcessorError::UnrecognisedResponse(trimmed.to_string()))
}

/// Submits runs to the processor and keeps run state consistent: after a
/// submission attempt the run is either submitted or failed, never pending.
pub struct SubmissionService {
    ledger: Arc<LedgerRepository>,
    audit: Arc<AuditLog>,
    client: ProcessorClient,
}

impl SubmissionService {
    pub fn new(ledger: Arc<LedgerRepository>, audit: Arc<AuditLog>, client: ProcessorClient) -> Self {
        Self {
            ledger,
            audit,
            client,
        }
    }

    /// Validates the batch file structurally, then transmits it. Structural
    /// failures never reach the network.
    pub async fn submit_run(&self, run_id: Uuid) -> AppResult<Run> {
        let run = self.ledger.get_run(run_id).await?;
        if run.status == RunStatus::Completed || run.status == RunStatus::Submitted {
            return Err(BatchError::InvalidState {
                current: run.status.to_string(),
                expected: "pending or failed".to_string(),
            }
            .into());
        }

        let contents = tokio::fs::read_to_string(&run.file_path).await?;

        if let Err(e) = validate_batch_file(&contents) {
            let message = e.to_string();
            self.ledger.mark_run_failed(run_id, message.clone()).await?;
            self.audit
                .record(
                    "system",
                    "run_submission_failed",
                    "run",
                    &run_id.to_string(),
                    message,
                )
                .await;
            return Err(e.into());
        }

        match self.client.submit_batch(&run.batch_name, &contents).await {
            Ok(batch_ref) => {
                let run = self.ledger.mark_run_submitted(run_id, batch_ref.clone()).await?;

                // the whole run is now in flight
                let txs = self
                    .ledger
                    .list_transactions(&crate::ledger::repository::TransactionFilter {
                        run_id: Some(run_id),
                        status: Some(TransactionStatus::Pending),
                        ..Default::default()
                    })
                    .await?;
                for tx in txs {
                    self.ledger
                        .apply_status(tx.id, TransactionStatus::Processing, None, None, None)
                        .await?;
                }

                self.audit
                    .record(
                        "system",
                        "run_submitted",
                        "run",
                        &run_id.to_string(),
                        format!("processor batch ref {}", batch_ref),
                    )
                    .await;
                info!(run_id = %run_id, batch_ref = %batch_ref, "Run submitted to processor");
                Ok(run)
            }
            Err(e) => {
                let message = e.to_string();
                self.ledger.mark_run_failed(run_id, message.clone()).await?;
                self.audit
                    .record(
                        "system",
                        "run_submission_failed",
                        "run",
                        &run_id.to_string(),
                        message,
                    )
                    .await;
                error!(run_id = %run_id, "Run submission failed: {}", e);
                Err(e)
            }
        }
    }

    /// Explicit status poll; funnels the outcome through the same mapping
    /// used for webhook updates.
    pub async fn poll_run_status(&self, run_id: Uuid) -> AppResult<Run> {
        let run = self.ledger.get_run(run_id).await?;
        let batch_ref = run.processor_batch_ref.clone().ok_or_else(|| {
            crate::error::AppError::Batch(BatchError::InvalidState {
                current: run.status.to_string(),
                expected: "submitted".to_string(),
            })
        })?;

        let external = self.client.poll_batch_status(&batch_ref).await?;
        let mapped = map_processor_batch_status(&external);
        let updated = self.ledger.apply_run_status(run_id, mapped).await?;
        info!(run_id = %run_id, external = %external, status = %updated.status, "Run status polled");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::ledger::models::BatchType;

    #[test]
    fn numeric_body_is_an_accepted_reference() {
        assert_eq!(parse_submit_response("24137").unwrap(), "24137");
        assert_eq!(parse_submit_response(" \"24137\" ").unwrap(), "24137");
    }

    #[test]
    fn error_code_body_is_a_rejection() {
        match parse_submit_response("-4: service key invalid") {
            Err(ProcessorError::Rejected(msg)) => assert!(msg.contains("-4")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn garbage_body_is_unrecognised() {
        assert!(matches!(
            parse_submit_response("<html>oops</html>"),
            Err(ProcessorError::UnrecognisedResponse(_))
        ));
        assert!(matches!(
            parse_submit_response(""),
            Err(ProcessorError::UnrecognisedResponse(_))
        ));
    }

    async fn service_with_run(file_contents: &str) -> (SubmissionService, Arc<LedgerRepository>, Uuid) {
        let ledger = Arc::new(LedgerRepository::new());
        let audit = Arc::new(AuditLog::new());
        let client = ProcessorClient::new(ProcessorConfig {
            // unroutable; tests exercising this path expect fast refusal
            base_url: "http://127.0.0.1:9".to_string(),
            service_key: "svc".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let dir = std::env::temp_dir().join(format!("sub-{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("batch.txt");
        std::fs::write(&file_path, file_contents).unwrap();

        let run_id = Uuid::new_v4();
        ledger
            .create_run(Run {
                id: run_id,
                run_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                batch_name: "COL-20240304-test".to_string(),
                batch_type: BatchType::TwoDay,
                member_count: 1,
                total_amount: dec!(450),
                file_path: file_path.to_string_lossy().to_string(),
                status: RunStatus::Pending,
                processor_batch_ref: None,
                error_message: None,
                created_at: Utc::now(),
                submitted_at: None,
                completed_at: None,
            })
            .await
            .unwrap();

        let service = SubmissionService::new(ledger.clone(), audit, client);
        (service, ledger, run_id)
    }

    #[tokio::test]
    async fn structurally_invalid_file_fails_before_any_network_call() {
        let (service, ledger, run_id) = service_with_run("H\tonly-a-header\r\n").await;
        let result = service.submit_run(run_id).await;
        assert!(matches!(
            result,
            Err(crate::error::AppError::Batch(BatchError::InvalidBatchFile(_)))
        ));
        let run = ledger.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.is_some());
    }

    #[tokio::test]
    async fn transport_failure_marks_run_failed_not_pending() {
        let contents = "H\tsvc\t1\tTWO DAY\tB\t20240304\tv\r\nK\t101\r\nT\tref\tname\t1\th\t2\t250655\t0\t62000001\t\t45000\te\tg\tm\t20240304\r\nF\t1\t45000\t9999\r\n";
        let (service, ledger, run_id) = service_with_run(contents).await;
        let result = service.submit_run(run_id).await;
        assert!(result.is_err());
        let run = ledger.get_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn poll_requires_a_batch_reference() {
        let (service, _ledger, run_id) = service_with_run("H\r\n").await;
        let result = service.poll_run_status(run_id).await;
        assert!(matches!(
            result,
            Err(crate::error::AppError::Batch(BatchError::InvalidState { .. }))
        ));
    }
}
