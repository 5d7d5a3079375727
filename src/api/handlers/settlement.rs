use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use tracing::info;

use crate::api::{auth::ensure_admin_authorized, state::AppState, types::SettlementStatus};
use crate::settlement::BatchSummary;

/// POST /settlement/run -- run one pass synchronously
///
/// An aborted pass answers 503 with the summary carrying the error.
pub async fn run_settlement(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> std::result::Result<(StatusCode, Json<BatchSummary>), (StatusCode, String)> {
    ensure_admin_authorized(state.admin_token.as_deref(), &headers)?;

    info!("Operator requested a settlement pass");
    let summary = state.scheduler.run_manual().await;

    let status = if summary.is_aborted() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}

/// GET /settlement/status
pub async fn get_settlement_status(State(state): State<AppState>) -> Json<SettlementStatus> {
    let scheduler = &state.scheduler;
    Json(SettlementStatus {
        authority_configured: scheduler.orchestrator().can_submit(),
        authority_address: state.authority_address.clone(),
        schedule: scheduler.schedule().to_string(),
        run_on_startup: scheduler.run_on_startup(),
        running: scheduler.is_running(),
        last_run: scheduler.last_run().await,
    })
}
