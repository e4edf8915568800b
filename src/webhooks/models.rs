use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Inbound processor callback. Either a transaction reference or a batch
/// reference identifies the target; everything else is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorWebhookPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ProcessorWebhookPayload {
    /// Canonical body the signature covers: the payload itself with the
    /// signature field removed.
    pub fn canonical_body(&self) -> AppResult<String> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        serde_json::to_string(&unsigned)
            .map_err(|e| AppError::Internal(format!("canonicalising webhook payload: {}", e)))
    }
}

/// Audit record of one inbound callback, written before any processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLog {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub processed: bool,
    pub error_message: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Counters over the webhook log.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookStats {
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
}

pub struct WebhookLogRepository {
    logs: tokio::sync::RwLock<HashMap<Uuid, WebhookLog>>,
}

impl WebhookLogRepository {
    pub fn new() -> Self {
        Self {
            logs: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(
        &self,
        payload: serde_json::Value,
        signature: Option<String>,
    ) -> AppResult<WebhookLog> {
        let log = WebhookLog {
            id: Uuid::new_v4(),
            payload,
            signature,
            processed: false,
            error_message: None,
            received_at: Utc::now(),
            processed_at: None,
        };
        let mut logs = self.logs.write().await;
        logs.insert(log.id, log.clone());
        Ok(log)
    }

    pub async fn get(&self, log_id: Uuid) -> AppResult<WebhookLog> {
        let logs = self.logs.read().await;
        logs.get(&log_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Webhook log {} not found", log_id)))
    }

    /// The only mutation a log entry sees after insert.
    pub async fn mark_outcome(&self, log_id: Uuid, error: Option<String>) -> AppResult<WebhookLog> {
        let mut logs = self.logs.write().await;
        let log = logs
            .get_mut(&log_id)
            .ok_or_else(|| AppError::NotFound(format!("Webhook log {} not found", log_id)))?;

        log.processed = error.is_none();
        log.error_message = error;
        log.processed_at = Some(Utc::now());

        Ok(log.clone())
    }

    /// Most recent first, bounded.
    pub async fn list_recent(&self, limit: usize) -> AppResult<Vec<WebhookLog>> {
        let logs = self.logs.read().await;
        let mut all: Vec<WebhookLog> = logs.values().cloned().collect();
        all.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        all.truncate(limit);
        Ok(all)
    }

    pub async fn stats(&self) -> AppResult<WebhookStats> {
        let logs = self.logs.read().await;
        let received = logs.len() as u64;
        let processed = logs.values().filter(|l| l.processed).count() as u64;
        let failed = logs
            .values()
            .filter(|l| !l.processed && l.error_message.is_some())
            .count() as u64;
        Ok(WebhookStats {
            received,
            processed,
            failed,
        })
    }
}
