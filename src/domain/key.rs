use serde::{Deserialize, Serialize};

use super::fixture::FixtureId;

/// Composite key shared by the oracle and payout contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FixtureKey {
    pub gameweek: u32,
    pub match_id: FixtureId,
}

impl FixtureKey {
    pub fn new(gameweek: u32, match_id: FixtureId) -> Self {
        Self { gameweek, match_id }
    }
}

impl std::fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GW{}#{}", self.gameweek, self.match_id)
    }
}
