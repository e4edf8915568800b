use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::error::{AppResult, WebhookError};
use crate::ledger::models::{map_processor_batch_status, map_processor_status, TransactionStatus};
use crate::ledger::LedgerRepository;
use crate::tracker::TransactionTracker;
use crate::webhooks::models::{ProcessorWebhookPayload, WebhookLog, WebhookLogRepository};
use crate::webhooks::signature;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: String,
}

/// Receives processor callbacks: logs first, verifies, then dispatches by
/// payload shape. Failed entries can be replayed once the cause is fixed.
pub struct WebhookIngestor {
    logs: Arc<WebhookLogRepository>,
    ledger: Arc<LedgerRepository>,
    tracker: Arc<TransactionTracker>,
    audit: Arc<AuditLog>,
    config: WebhookConfig,
}

impl WebhookIngestor {
    pub fn new(
        logs: Arc<WebhookLogRepository>,
        ledger: Arc<LedgerRepository>,
        tracker: Arc<TransactionTracker>,
        audit: Arc<AuditLog>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            logs,
            ledger,
            tracker,
            audit,
            config,
        }
    }

    /// Entry point for the HTTP handler. The raw payload is persisted
    /// before any parsing or verification, so malformed and unverifiable
    /// events are still retained for audit.
    pub async fn ingest(&self, raw: serde_json::Value) -> AppResult<WebhookLog> {
        let signature = raw
            .get("signature")
            .and_then(|v| v.as_str())
            .map(String::from);
        let log = self.logs.insert(raw.clone(), signature).await?;

        match self.parse_and_process(&raw).await {
            Ok(()) => {
                let updated = self.logs.mark_outcome(log.id, None).await?;
                info!(log_id = %log.id, "Webhook processed");
                Ok(updated)
            }
            Err(e) => {
                self.logs.mark_outcome(log.id, Some(e.to_string())).await?;
                warn!(log_id = %log.id, "Webhook processing failed: {}", e);
                Err(e)
            }
        }
    }

    /// Re-parses a stored payload and runs it through verification and
    /// dispatch again. Only unprocessed entries can be replayed.
    pub async fn replay(&self, log_id: Uuid) -> AppResult<WebhookLog> {
        let log = self.logs.get(log_id).await?;
        if log.processed {
            return Err(WebhookError::AlreadyProcessed.into());
        }

        match self.parse_and_process(&log.payload).await {
            Ok(()) => {
                let updated = self.logs.mark_outcome(log_id, None).await?;
                self.audit
                    .record(
                        "operator",
                        "webhook_replayed",
                        "webhook_log",
                        &log_id.to_string(),
                        "replay succeeded".to_string(),
                    )
                    .await;
                Ok(updated)
            }
            Err(e) => {
                self.logs.mark_outcome(log_id, Some(e.to_string())).await?;
                Err(e)
            }
        }
    }

    async fn parse_and_process(&self, raw: &serde_json::Value) -> AppResult<()> {
        let payload: ProcessorWebhookPayload = serde_json::from_value(raw.clone())
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        self.process(&payload).await
    }

    async fn process(&self, payload: &ProcessorWebhookPayload) -> AppResult<()> {
        if let Some(sig) = &payload.signature {
            let canonical = payload.canonical_body()?;
            if !signature::verify(&self.config.secret, &canonical, sig) {
                return Err(WebhookError::InvalidSignature.into());
            }
        }

        if let Some(tx_ref) = &payload.transaction_ref {
            let tx = self.ledger.find_transaction_by_ref(tx_ref).await?;
            let status = map_processor_status(payload.status.as_deref().unwrap_or(""));

            let response = payload.response_message.clone().or_else(|| {
                payload
                    .status
                    .as_ref()
                    .map(|s| format!("processor status: {}", s))
            });
            let failure_reason = if status == TransactionStatus::Failed {
                payload
                    .response_message
                    .clone()
                    .or_else(|| Some("declined by processor".to_string()))
            } else {
                None
            };

            self.tracker
                .update_status(
                    tx.id,
                    status,
                    payload.processor_ref.clone(),
                    response,
                    failure_reason,
                )
                .await?;
            Ok(())
        } else if let Some(batch_ref) = &payload.batch_ref {
            let run = self.ledger.find_run_by_batch_ref(batch_ref).await?;
            let status = map_processor_batch_status(payload.status.as_deref().unwrap_or(""));
            self.ledger.apply_run_status(run.id, status).await?;
            Ok(())
        } else {
            Err(WebhookError::UnknownType.into())
        }
    }
}
