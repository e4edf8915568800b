use std::sync::Arc;

use tracing::info;

use crate::{
    api::handler::AppState,
    audit::AuditLog,
    batch::generator::BatchConfig,
    batch::BatchGenerator,
    config::Config,
    error::AppResult,
    jobs::{JobScheduler, JobsConfig},
    ledger::LedgerRepository,
    members::MemberRepository,
    processor::{ProcessorClient, ProcessorConfig, SubmissionService},
    reconciliation::{ReconciliationEngine, ReconciliationRepository},
    tracker::TransactionTracker,
    webhooks::{WebhookConfig, WebhookIngestor, WebhookLogRepository},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components...");

    // Stores
    let ledger = Arc::new(LedgerRepository::new());
    let members = Arc::new(MemberRepository::new());
    let audit = Arc::new(AuditLog::new());
    let webhook_logs = Arc::new(WebhookLogRepository::new());
    let recon_repo = Arc::new(ReconciliationRepository::new());
    info!("Stores initialized");

    // Batch generation
    let generator = Arc::new(BatchGenerator::new(
        ledger.clone(),
        members.clone(),
        audit.clone(),
        BatchConfig {
            service_key: config.processor_service_key.clone(),
            vendor_key: config.software_vendor_key.clone(),
            batch_dir: config.batch_dir.clone(),
        },
    ));
    info!("Batch generator initialized, files under {}", config.batch_dir);

    // Processor client + submission
    let client = ProcessorClient::new(ProcessorConfig {
        base_url: config.processor_base_url.clone(),
        service_key: config.processor_service_key.clone(),
        timeout: config.processor_timeout(),
    })?;
    let submission = Arc::new(SubmissionService::new(
        ledger.clone(),
        audit.clone(),
        client,
    ));
    info!(
        "Processor client initialized for {} (timeout {}s)",
        config.processor_base_url, config.processor_timeout_secs
    );

    // Transaction lifecycle
    let tracker = Arc::new(TransactionTracker::new(
        ledger.clone(),
        members.clone(),
        audit.clone(),
    ));

    // Webhook ingestion
    let webhook_ingestor = Arc::new(WebhookIngestor::new(
        webhook_logs.clone(),
        ledger.clone(),
        tracker.clone(),
        audit.clone(),
        WebhookConfig {
            secret: config.webhook_secret.clone(),
        },
    ));
    info!("Webhook ingestor initialized");

    // Reconciliation
    let recon_engine = Arc::new(ReconciliationEngine::new(
        ledger.clone(),
        recon_repo.clone(),
        audit.clone(),
    ));

    // Daily background jobs: retry sweep + auto reconciliation
    let scheduler = JobScheduler::new(
        JobsConfig {
            execution_hour: config.jobs_hour,
        },
        tracker.clone(),
        recon_engine.clone(),
    );
    scheduler.start();
    info!(
        "Job scheduler started (daily at {:02}:00 UTC)",
        config.jobs_hour
    );

    Ok(AppState {
        members,
        ledger,
        audit,
        generator,
        submission,
        tracker,
        webhook_ingestor,
        webhook_logs,
        recon_engine,
        recon_repo,
    })
}
