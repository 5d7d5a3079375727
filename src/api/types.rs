use serde::{Deserialize, Serialize};

use crate::settlement::BatchSummary;

/// GET /settlement/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementStatus {
    pub authority_configured: bool,
    pub authority_address: Option<String>,
    pub schedule: String,
    pub run_on_startup: bool,
    pub running: bool,
    pub last_run: Option<BatchSummary>,
}

/// GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
    pub uptime_secs: i64,
    pub version: String,
}
