use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handler::{
    batches_due, collection_date, escalate_transaction, generate_batch, get_batch, health_check, list_audit, list_batches,
    list_discrepancies, list_escalations, list_members, list_reconciliations, list_transactions,
    list_webhooks, load_members, poll_batch_status, processor_webhook, replay_webhook,
    resolve_discrepancy, retry_transaction, run_reconciliation, statement_reconciliation,
    submit_batch, webhook_stats, AppState,
};

pub async fn create_app(state: AppState) -> Router {
    info!("Setting up HTTP routes...");

    let app = Router::new()
        // Public health check endpoint
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Batch endpoints
                .route("/batches", post(generate_batch).get(list_batches))
                .route("/batches/due", get(batches_due))
                .route("/batches/:id", get(get_batch))
                .route("/batches/:id/submit", post(submit_batch))
                .route("/batches/:id/poll", get(poll_batch_status))
                .route("/scheduling/collection-date", get(collection_date))
                // Transaction endpoints
                .route("/transactions", get(list_transactions))
                .route("/transactions/:id/retry", post(retry_transaction))
                .route("/transactions/:id/escalate", post(escalate_transaction))
                .route("/escalations", get(list_escalations))
                // Reconciliation endpoints
                .route(
                    "/reconciliations",
                    post(run_reconciliation).get(list_reconciliations),
                )
                .route(
                    "/reconciliations/:id/discrepancies",
                    get(list_discrepancies),
                )
                .route("/reconciliations/statement", post(statement_reconciliation))
                .route("/discrepancies/:id/resolve", post(resolve_discrepancy))
                // Webhook endpoints
                .route("/webhooks/processor", post(processor_webhook))
                .route("/webhooks/:id/replay", post(replay_webhook))
                .route("/webhooks", get(list_webhooks))
                .route("/webhooks/stats", get(webhook_stats))
                // Roster endpoints
                .route("/members/load", post(load_members))
                .route("/members", get(list_members))
                // Audit trail
                .route("/audit", get(list_audit)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
