//! Service wiring: builds the bridges, the pool ledger and the orchestrator
//! from configuration.

use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::{
    ContractOracle, ContractPayoutLedger, HttpFixtureFeed, LedgerConnection, PostgresPoolStore,
};
use crate::config::AppConfig;
use crate::error::{PitchError, Result};
use crate::ledger::PoolLedger;
use crate::settlement::{Scheduler, SettlementOrchestrator};
use crate::signing::SettlementAuthority;

/// Everything a command needs, built once per process
pub struct Services {
    pub config: AppConfig,
    pub authority: Option<SettlementAuthority>,
    pub connection: LedgerConnection,
    pub feed: Arc<HttpFixtureFeed>,
    pub pool_store: Option<PostgresPoolStore>,
    pub orchestrator: Arc<SettlementOrchestrator>,
}

impl Services {
    pub async fn build(config: AppConfig) -> Result<Self> {
        if let Err(errors) = config.validate() {
            return Err(PitchError::InvalidConfig(errors.join("; ")));
        }

        let authority = SettlementAuthority::from_env()?;
        if authority.is_none() {
            warn!("SETTLEMENT_PRIVATE_KEY not set: running read-only, settlement passes will abort");
        }

        let connection = LedgerConnection::connect(&config.ledger, authority.clone())?;
        let oracle = ContractOracle::new(connection.clone(), &config.ledger.oracle_address)?;
        let payout_ledger = ContractPayoutLedger::new(connection.clone(), &config.ledger)?;
        let feed = Arc::new(HttpFixtureFeed::new(&config.feed)?);

        let pool_store = match &config.database {
            Some(db) => Some(PostgresPoolStore::new(&db.url, db.max_connections).await?),
            None => {
                info!("No database configured: pool ledger mirror disabled");
                None
            }
        };

        let mut orchestrator = SettlementOrchestrator::new(
            feed.clone(),
            Arc::new(oracle),
            Arc::new(payout_ledger),
            chrono::Duration::minutes(config.feed.grace_period_mins),
        );
        if let Some(store) = &pool_store {
            orchestrator = orchestrator.with_mirror(PoolLedger::new(Arc::new(store.clone())));
        }

        Ok(Self {
            config,
            authority,
            connection,
            feed,
            pool_store,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn scheduler(&self) -> Result<Arc<Scheduler>> {
        let schedule = self
            .config
            .settlement
            .parsed_schedule()
            .map_err(PitchError::InvalidConfig)?;
        Ok(Arc::new(Scheduler::new(
            self.orchestrator.clone(),
            schedule,
            self.config.settlement.run_on_startup,
        )))
    }

    pub fn pool_ledger(&self) -> Option<PoolLedger> {
        self.pool_store
            .as_ref()
            .map(|store| PoolLedger::new(Arc::new(store.clone())))
    }

    pub fn authority_address(&self) -> Option<String> {
        self.authority.as_ref().map(|a| a.address().to_string())
    }
}
