use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fixture::Outcome;
use super::key::FixtureKey;

/// Status code the oracle expects for a completed match
pub const FULL_TIME: &str = "FT";

/// Result stored by the oracle contract. Write-once per key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub key: FixtureKey,
    pub home_score: u8,
    pub away_score: u8,
    pub status: String,
    pub recorded_at: Option<DateTime<Utc>>,
    pub exists: bool,
}

impl OutcomeRecord {
    pub fn winning_outcome(&self) -> Outcome {
        Outcome::from_scores(self.home_score, self.away_score)
    }

    pub fn is_full_time(&self) -> bool {
        self.status == FULL_TIME
    }
}

/// Receipt of a confirmed ledger write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}
