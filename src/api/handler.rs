use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::models::*;
use crate::{
    audit::{AuditEvent, AuditLog},
    batch::generator::GenerateBatchRequest as GenerateRequest,
    batch::BatchGenerator,
    error::{AppError, AppResult},
    ledger::{
        models::{Escalation, Transaction},
        repository::TransactionFilter,
        LedgerRepository,
    },
    members::{models::Member, MemberRepository},
    processor::SubmissionService,
    reconciliation::{
        models::{Discrepancy, Reconciliation, StatementMatch},
        ReconciliationEngine, ReconciliationRepository,
    },
    tracker::TransactionTracker,
    webhooks::{
        models::{WebhookLog, WebhookStats},
        WebhookIngestor, WebhookLogRepository,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub members: Arc<MemberRepository>,
    pub ledger: Arc<LedgerRepository>,
    pub audit: Arc<AuditLog>,
    pub generator: Arc<BatchGenerator>,
    pub submission: Arc<SubmissionService>,
    pub tracker: Arc<TransactionTracker>,
    pub webhook_ingestor: Arc<WebhookIngestor>,
    pub webhook_logs: Arc<WebhookLogRepository>,
    pub recon_engine: Arc<ReconciliationEngine>,
    pub recon_repo: Arc<ReconciliationRepository>,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    })
}

// ===== members =====

/// POST /api/v1/members/load
pub async fn load_members(
    State(state): State<AppState>,
    Json(request): Json<LoadMembersRequest>,
) -> AppResult<Json<LoadMembersResponse>> {
    let mut loaded = 0;
    for import in request.members {
        import
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let now = Utc::now();
        state
            .members
            .upsert(Member {
                id: Uuid::new_v4(),
                member_number: import.member_number,
                full_name: import.full_name,
                email: import.email,
                bank_name: import.bank_name,
                account_holder: import.account_holder,
                account_number: import.account_number,
                branch_code: import.branch_code,
                monthly_premium: import.monthly_premium,
                broker_group: import.broker_group,
                debit_order_status: import.debit_order_status,
                next_debit_date: import.next_debit_date,
                arrears_balance: rust_decimal::Decimal::ZERO,
                created_at: now,
                updated_at: now,
            })
            .await?;
        loaded += 1;
    }
    info!(loaded, "Member roster loaded");
    Ok(Json(LoadMembersResponse { loaded }))
}

/// GET /api/v1/members
pub async fn list_members(State(state): State<AppState>) -> AppResult<Json<Vec<Member>>> {
    Ok(Json(state.members.list().await?))
}

// ===== batches =====

/// POST /api/v1/batches
pub async fn generate_batch(
    State(state): State<AppState>,
    Json(request): Json<GenerateBatchRequest>,
) -> AppResult<Json<BatchSummaryResponse>> {
    let summary = state
        .generator
        .generate(GenerateRequest {
            action_date: request.action_date,
            batch_type: request.batch_type,
            broker_groups: request.broker_groups,
        })
        .await?;

    let run = if request.auto_submit {
        match state.submission.submit_run(summary.run.id).await {
            Ok(run) => run,
            Err(e) => {
                // the run is marked failed; the summary is still returned
                warn!(run_id = %summary.run.id, "Auto-submit failed: {}", e);
                state.ledger.get_run(summary.run.id).await?
            }
        }
    } else {
        summary.run
    };

    Ok(Json(BatchSummaryResponse {
        run: run.into(),
        validation_errors: summary.validation_failures,
    }))
}

/// POST /api/v1/batches/:id/submit
pub async fn submit_batch(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<RunResponse>> {
    let run = state.submission.submit_run(run_id).await?;
    Ok(Json(run.into()))
}

/// GET /api/v1/batches/:id
pub async fn get_batch(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<RunResponse>> {
    let run = state.ledger.get_run(run_id).await?;
    Ok(Json(run.into()))
}

/// GET /api/v1/batches
pub async fn list_batches(State(state): State<AppState>) -> AppResult<Json<Vec<RunResponse>>> {
    let runs = state.ledger.list_runs().await?;
    Ok(Json(runs.into_iter().map(RunResponse::from).collect()))
}

/// GET /api/v1/batches/due
pub async fn batches_due(
    State(state): State<AppState>,
    Query(query): Query<DueQuery>,
) -> AppResult<Json<Vec<crate::batch::generator::DueStrikeDate>>> {
    let today = query.date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(state.generator.due_for_submission(today).await?))
}

/// GET /api/v1/scheduling/collection-date
pub async fn collection_date(Query(query): Query<CollectionDateQuery>) -> Json<CollectionDateResponse> {
    let today = Utc::now().date_naive();
    let strike = crate::scheduling::next_collection_date(today, query.days_ahead.unwrap_or(2));
    Json(CollectionDateResponse {
        strike_date: strike,
        submission_date: crate::scheduling::submission_date(strike),
    })
}

/// GET /api/v1/batches/:id/poll
pub async fn poll_batch_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<RunResponse>> {
    let run = state.submission.poll_run_status(run_id).await?;
    Ok(Json(run.into()))
}

// ===== transactions =====

/// GET /api/v1/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<TransactionResponse>>> {
    let transactions: Vec<Transaction> = state
        .ledger
        .list_transactions(&TransactionFilter {
            run_id: query.run_id,
            member_id: query.member_id,
            status: query.status,
            date: query.date,
        })
        .await?;
    Ok(Json(
        transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
    ))
}

/// POST /api/v1/transactions/:id/retry
pub async fn retry_transaction(
    State(state): State<AppState>,
    Path(tx_id): Path<Uuid>,
) -> AppResult<Json<TransactionResponse>> {
    let tx = state.tracker.retry(tx_id, "operator").await?;
    Ok(Json(tx.into()))
}

/// POST /api/v1/transactions/:id/escalate
pub async fn escalate_transaction(
    State(state): State<AppState>,
    Path(tx_id): Path<Uuid>,
    Json(request): Json<EscalateRequest>,
) -> AppResult<Json<EscalateResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let created = state
        .tracker
        .escalate(tx_id, &request.reason, request.assigned_to, "operator")
        .await?;

    Ok(Json(match created {
        Some(escalation) => EscalateResponse {
            created: true,
            escalation_id: Some(escalation.id),
            message: "escalation created".to_string(),
        },
        None => EscalateResponse {
            created: false,
            escalation_id: None,
            message: "transaction already has an open escalation".to_string(),
        },
    }))
}

/// GET /api/v1/escalations
pub async fn list_escalations(State(state): State<AppState>) -> AppResult<Json<Vec<Escalation>>> {
    Ok(Json(state.ledger.list_escalations().await?))
}

// ===== reconciliation =====

/// POST /api/v1/reconciliations
pub async fn run_reconciliation(
    State(state): State<AppState>,
    Json(request): Json<RunReconciliationRequest>,
) -> AppResult<Json<Reconciliation>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    let reconciliation = state
        .recon_engine
        .run_reconciliation(request.date, &request.performed_by)
        .await?;
    Ok(Json(reconciliation))
}

/// GET /api/v1/reconciliations
pub async fn list_reconciliations(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Reconciliation>>> {
    Ok(Json(state.recon_repo.list().await?))
}

/// GET /api/v1/reconciliations/:id/discrepancies
pub async fn list_discrepancies(
    State(state): State<AppState>,
    Path(reconciliation_id): Path<Uuid>,
) -> AppResult<Json<Vec<Discrepancy>>> {
    // surface not-found on a bad id rather than an empty list
    state.recon_repo.get(reconciliation_id).await?;
    Ok(Json(
        state.recon_repo.list_discrepancies(reconciliation_id).await?,
    ))
}

/// POST /api/v1/discrepancies/:id/resolve
pub async fn resolve_discrepancy(
    State(state): State<AppState>,
    Path(discrepancy_id): Path<Uuid>,
    Json(request): Json<ResolveDiscrepancyRequest>,
) -> AppResult<Json<Discrepancy>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    let resolved = state
        .recon_engine
        .resolve_discrepancy(
            discrepancy_id,
            request.resolution,
            request.notes,
            &request.resolved_by,
        )
        .await?;
    Ok(Json(resolved))
}

/// POST /api/v1/reconciliations/statement
pub async fn statement_reconciliation(
    State(state): State<AppState>,
    Json(request): Json<StatementReconciliationRequest>,
) -> AppResult<Json<Vec<StatementMatch>>> {
    let matches = state
        .recon_engine
        .reconcile_statement(request.date, &request.lines)
        .await?;
    Ok(Json(matches))
}

// ===== webhooks =====

/// POST /api/v1/webhooks/processor
pub async fn processor_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<Json<WebhookResponse>> {
    let log = state.webhook_ingestor.ingest(payload).await?;
    Ok(Json(WebhookResponse {
        log_id: log.id,
        processed: log.processed,
    }))
}

/// POST /api/v1/webhooks/:id/replay
pub async fn replay_webhook(
    State(state): State<AppState>,
    Path(log_id): Path<Uuid>,
) -> AppResult<Json<WebhookResponse>> {
    let log = state.webhook_ingestor.replay(log_id).await?;
    Ok(Json(WebhookResponse {
        log_id: log.id,
        processed: log.processed,
    }))
}

/// GET /api/v1/webhooks
pub async fn list_webhooks(State(state): State<AppState>) -> AppResult<Json<Vec<WebhookLog>>> {
    Ok(Json(state.webhook_logs.list_recent(100).await?))
}

/// GET /api/v1/webhooks/stats
pub async fn webhook_stats(State(state): State<AppState>) -> AppResult<Json<WebhookStats>> {
    Ok(Json(state.webhook_logs.stats().await?))
}

// ===== audit =====

/// GET /api/v1/audit
pub async fn list_audit(State(state): State<AppState>) -> AppResult<Json<Vec<AuditEvent>>> {
    Ok(Json(state.audit.recent(200).await))
}
