use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Reconciliation error: {0}")]
    Reconciliation(#[from] ReconciliationError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Batch generation / file errors
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No valid members for batch")]
    NoValidMembers,

    #[error("Invalid batch file: {0}")]
    InvalidBatchFile(String),

    #[error("Failed to write batch file: {0}")]
    FileWrite(String),

    #[error("Run in invalid state: {current}, expected: {expected}")]
    InvalidState { current: String, expected: String },
}

/// Transaction lifecycle errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction is not in a retryable state: {0}")]
    InvalidStateForRetry(String),

    #[error("Maximum retry attempts reached")]
    MaxRetriesExceeded,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Webhook ingestion errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Unknown webhook type")]
    UnknownType,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Webhook log already processed")]
    AlreadyProcessed,
}

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("Reconciliation already exists for {0}")]
    AlreadyReconciled(chrono::NaiveDate),

    #[error("Discrepancy already resolved")]
    AlreadyResolved,
}

/// External processor errors
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Processor transport failure: {0}")]
    Transport(String),

    #[error("Batch rejected by processor: {0}")]
    Rejected(String),

    #[error("Unrecognised processor response: {0}")]
    UnrecognisedResponse(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                format!("Invalid input: {}", msg),
            ),
            AppError::Batch(BatchError::NoValidMembers) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "NO_VALID_MEMBERS",
                "No valid members for batch".to_string(),
            ),
            AppError::Batch(BatchError::InvalidBatchFile(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_BATCH_FILE",
                format!("Invalid batch file: {}", msg),
            ),
            AppError::Batch(BatchError::InvalidState { current, expected }) => (
                StatusCode::CONFLICT,
                "INVALID_RUN_STATE",
                format!("Run in state {}, expected {}", current, expected),
            ),
            AppError::Transaction(TransactionError::InvalidStateForRetry(state)) => (
                StatusCode::CONFLICT,
                "INVALID_STATE_FOR_RETRY",
                format!("Transaction in state {} cannot be retried", state),
            ),
            AppError::Transaction(TransactionError::MaxRetriesExceeded) => (
                StatusCode::CONFLICT,
                "MAX_RETRIES_EXCEEDED",
                "Maximum retry attempts reached".to_string(),
            ),
            AppError::Transaction(TransactionError::InvalidTransition { from, to }) => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                format!("Invalid status transition: {} -> {}", from, to),
            ),
            AppError::Webhook(WebhookError::InvalidSignature) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_SIGNATURE",
                "Invalid webhook signature".to_string(),
            ),
            AppError::Webhook(WebhookError::UnknownType) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNKNOWN_WEBHOOK_TYPE",
                "Unknown webhook type".to_string(),
            ),
            AppError::Webhook(WebhookError::MalformedPayload(msg)) => (
                StatusCode::BAD_REQUEST,
                "MALFORMED_PAYLOAD",
                format!("Malformed webhook payload: {}", msg),
            ),
            AppError::Webhook(WebhookError::AlreadyProcessed) => (
                StatusCode::CONFLICT,
                "ALREADY_PROCESSED",
                "Webhook log already processed".to_string(),
            ),
            AppError::Reconciliation(ReconciliationError::AlreadyReconciled(date)) => (
                StatusCode::CONFLICT,
                "ALREADY_RECONCILED",
                format!("Reconciliation already exists for {}", date),
            ),
            AppError::Reconciliation(ReconciliationError::AlreadyResolved) => (
                StatusCode::CONFLICT,
                "ALREADY_RESOLVED",
                "Discrepancy already resolved".to_string(),
            ),
            AppError::Processor(ProcessorError::Transport(msg)) => (
                StatusCode::BAD_GATEWAY,
                "PROCESSOR_TRANSPORT",
                format!("Processor transport failure: {}", msg),
            ),
            AppError::Processor(ProcessorError::Rejected(msg)) => (
                StatusCode::BAD_GATEWAY,
                "PROCESSOR_REJECTED",
                format!("Batch rejected by processor: {}", msg),
            ),
            AppError::Processor(ProcessorError::UnrecognisedResponse(msg)) => (
                StatusCode::BAD_GATEWAY,
                "PROCESSOR_RESPONSE",
                format!("Unrecognised processor response: {}", msg),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details: None,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            AppError::Processor(ProcessorError::Transport(error.to_string()))
        } else {
            AppError::Internal(format!("HTTP request error: {:?}", error))
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Batch(BatchError::FileWrite(error.to_string()))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
