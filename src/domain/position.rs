//! Boundary between the two wager ledgers.
//!
//! Off-ledger wagers enforce one position per user and fixture; on-ledger
//! wagers do not. Both feed the same payout calculator through [`Position`],
//! so neither schema is bent to fit the other.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::fixture::Outcome;
use super::wager::{OnLedgerWager, Wager};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ledger", rename_all = "snake_case")]
pub enum Position {
    OffLedger(Wager),
    OnLedger(OnLedgerWager),
}

impl Position {
    pub fn outcome(&self) -> Outcome {
        match self {
            Position::OffLedger(w) => w.outcome,
            Position::OnLedger(w) => w.prediction.outcome(),
        }
    }

    pub fn stake(&self) -> Decimal {
        match self {
            Position::OffLedger(w) => w.amount,
            Position::OnLedger(w) => w.amount,
        }
    }
}

impl From<Wager> for Position {
    fn from(wager: Wager) -> Self {
        Position::OffLedger(wager)
    }
}

impl From<OnLedgerWager> for Position {
    fn from(wager: OnLedgerWager) -> Self {
        Position::OnLedger(wager)
    }
}
