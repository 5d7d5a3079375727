use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::adapters::fixture_feed::{Bootstrap, FixtureRecord};
use crate::domain::{FixtureKey, OnLedgerWager, Outcome, OutcomeRecord, TxReceipt};
use crate::error::{FeedError, OracleError, SettleError};

/// Read-only access to the sports-data provider
#[async_trait]
pub trait FixtureFeed: Send + Sync {
    async fn fetch_all_fixtures(&self) -> Result<Vec<FixtureRecord>, FeedError>;

    async fn fetch_bootstrap(&self) -> Result<Bootstrap, FeedError>;

    /// Id of the gameweek currently in play
    async fn fetch_current_period(&self) -> Result<u32, FeedError> {
        let bootstrap = self.fetch_bootstrap().await?;
        bootstrap
            .current_period()
            .ok_or_else(|| FeedError::Unavailable("bootstrap lists no open gameweek".to_string()))
    }
}

/// Result of an outcome submission. `AlreadyExists` is a successful no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeSubmission {
    Submitted(TxReceipt),
    AlreadyExists(OutcomeRecord),
}

/// Write-once result store on the oracle contract
#[async_trait]
pub trait OutcomeOracle: Send + Sync {
    /// True when a settlement authority is available for writes
    fn can_submit(&self) -> bool;

    async fn has_outcome(&self, key: FixtureKey) -> Result<bool, OracleError>;

    async fn get_outcome(&self, key: FixtureKey) -> Result<OutcomeRecord, OracleError>;

    async fn submit_outcome(
        &self,
        key: FixtureKey,
        home_score: u8,
        away_score: u8,
        status: &str,
    ) -> Result<OutcomeSubmission, OracleError>;
}

/// Confirmed settlement with the decoded settlement event, if emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub receipt: TxReceipt,
    pub outcome: Option<Outcome>,
    pub total_payout: Option<Decimal>,
}

/// Wager store and settlement entry point on the payout contract
#[async_trait]
pub trait PayoutLedger: Send + Sync {
    /// Verify the authority, RPC connection and gas balance before a pass
    async fn preflight(&self) -> Result<(), SettleError>;

    /// Unsettled wagers, capped per pass
    async fn list_unsettled_wagers(&self) -> Result<Vec<OnLedgerWager>, SettleError>;

    async fn is_fixture_settled(&self, key: FixtureKey) -> Result<bool, SettleError>;

    async fn settle(&self, key: FixtureKey) -> Result<SettlementReceipt, SettleError>;
}
