use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::settlement::Scheduler;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,

    /// Address of the settlement authority, if a key is configured
    pub authority_address: Option<String>,

    /// Token required for manual runs; open when unset
    pub admin_token: Option<String>,

    /// Pool ledger database, probed by /health
    pub db: Option<PgPool>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, authority_address: Option<String>) -> Self {
        Self {
            scheduler,
            authority_address,
            admin_token: None,
            db: None,
            start_time: Utc::now(),
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    pub fn with_db(mut self, pool: PgPool) -> Self {
        self.db = Some(pool);
        self
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
