//! Pari-mutuel payout calculator.
//!
//! Winning positions split the whole pool, less a fixed 5% fee, in proportion
//! to stake. The multiplier `total_payout / winning_pool` is the same for every
//! winning position on a fixture.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::{Fixture, FixtureStatus, Outcome, Pools, Position};

/// Share of the pool returned to winners
pub const PAYOUT_RATE: Decimal = dec!(0.95);

/// Decimal places kept on individual payouts
pub const PAYOUT_DECIMALS: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutInfo {
    pub winning_outcome: Outcome,
    pub total_pool: Decimal,
    pub winning_pool: Decimal,
    pub total_payout: Decimal,
}

impl PayoutInfo {
    /// Payout per unit staked on the winning outcome
    pub fn multiplier(&self) -> Decimal {
        self.total_payout / self.winning_pool
    }

    pub fn is_winner(&self, outcome: Outcome) -> bool {
        outcome == self.winning_outcome
    }

    /// Payout owed to a stake on `outcome`
    pub fn payout_for_stake(&self, outcome: Outcome, amount: Decimal) -> Decimal {
        if !self.is_winner(outcome) {
            return Decimal::ZERO;
        }
        (amount * self.total_payout / self.winning_pool).round_dp(PAYOUT_DECIMALS)
    }

    pub fn payout_for(&self, position: &Position) -> Decimal {
        self.payout_for_stake(position.outcome(), position.stake())
    }
}

/// Payout for a fixture, or `None` if it is not finished, has no final score,
/// or nobody backed the winning outcome.
pub fn compute_payout(fixture: &Fixture) -> Option<PayoutInfo> {
    if fixture.status != FixtureStatus::Finished {
        return None;
    }
    let (home, away) = fixture.final_score()?;
    compute_from_scores(home, away, &fixture.pools)
}

pub fn compute_from_scores(home_score: u8, away_score: u8, pools: &Pools) -> Option<PayoutInfo> {
    let winning_outcome = Outcome::from_scores(home_score, away_score);
    let total_pool = pools.total();
    let winning_pool = pools.side(winning_outcome).total;

    if winning_pool.is_zero() {
        return None;
    }

    Some(PayoutInfo {
        winning_outcome,
        total_pool,
        winning_pool,
        total_payout: total_pool * PAYOUT_RATE,
    })
}

/// Rebuild outcome pools from a set of positions
pub fn pools_from_positions<'a, I>(positions: I) -> Pools
where
    I: IntoIterator<Item = &'a Position>,
{
    let mut pools = Pools::default();
    for position in positions {
        pools.add_stake(position.outcome(), position.stake());
    }
    pools
}
