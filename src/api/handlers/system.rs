use axum::{extract::State, http::StatusCode, Json};

use crate::api::{state::AppState, types::HealthResponse};

/// GET /health -- lightweight liveness/readiness probe
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let db_status = match &state.db {
        None => "disabled".to_string(),
        Some(pool) => match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
            Ok(_) => "connected".to_string(),
            Err(_) => "disconnected".to_string(),
        },
    };

    let ok = db_status != "disconnected";
    let resp = HealthResponse {
        status: if ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        db: db_status,
        uptime_secs: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}
