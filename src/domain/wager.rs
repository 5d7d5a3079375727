use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::fixture::{FixtureId, Outcome};
use super::key::FixtureKey;

/// Lifecycle of an off-ledger wager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

impl WagerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WagerStatus::Pending => "pending",
            WagerStatus::Won => "won",
            WagerStatus::Lost => "lost",
            WagerStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WagerStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(WagerStatus::Pending),
            "won" => Ok(WagerStatus::Won),
            "lost" => Ok(WagerStatus::Lost),
            "cancelled" => Ok(WagerStatus::Cancelled),
            other => Err(format!("invalid wager status '{}'", other)),
        }
    }
}

/// Off-ledger wager. At most one per (user, fixture).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: Uuid,
    pub user_id: String,
    pub fixture_id: FixtureId,
    pub outcome: Outcome,
    pub amount: Decimal,
    pub status: WagerStatus,
    pub payout: Decimal,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Wager {
    pub fn new(user_id: &str, fixture_id: FixtureId, outcome: Outcome, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            fixture_id,
            outcome,
            amount,
            status: WagerStatus::Pending,
            payout: Decimal::ZERO,
            placed_at: Utc::now(),
            settled_at: None,
        }
    }
}

/// Status/payout assignment produced by a payout pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerSettlement {
    pub wager_id: Uuid,
    pub status: WagerStatus,
    pub payout: Decimal,
}

/// Prediction as encoded by the payout ledger contract (0 = home, 1 = draw, 2 = away)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Home,
    Draw,
    Away,
}

impl Prediction {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Prediction::Home),
            1 => Some(Prediction::Draw),
            2 => Some(Prediction::Away),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Prediction::Home => 0,
            Prediction::Draw => 1,
            Prediction::Away => 2,
        }
    }

    /// Home-relative outcome this prediction backs
    pub fn outcome(&self) -> Outcome {
        match self {
            Prediction::Home => Outcome::Win,
            Prediction::Draw => Outcome::Draw,
            Prediction::Away => Outcome::Lose,
        }
    }
}

/// Wager recorded inside the payout ledger contract.
///
/// The contract allows any number of these per bettor and fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnLedgerWager {
    pub id: u64,
    pub bettor: String,
    pub key: FixtureKey,
    pub prediction: Prediction,
    /// Stake in the ledger token's base units
    pub amount: Decimal,
    pub is_settled: bool,
    pub is_winner: bool,
    pub placed_at: DateTime<Utc>,
}
