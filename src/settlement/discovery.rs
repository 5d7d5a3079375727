use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{FixtureKey, OnLedgerWager, Position};

/// Unsettled on-ledger wagers sharing one fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerGroup {
    pub key: FixtureKey,
    /// Ordered by `(placed_at, id)`
    pub wagers: Vec<OnLedgerWager>,
}

impl WagerGroup {
    /// Earliest wager on the fixture
    pub fn opener(&self) -> Option<&OnLedgerWager> {
        self.wagers.first()
    }

    pub fn wager_count(&self) -> usize {
        self.wagers.len()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.wagers.iter().cloned().map(Position::from).collect()
    }
}

/// Group wagers by fixture. Only fixtures with at least one wager appear.
pub fn group_by_fixture(wagers: Vec<OnLedgerWager>) -> BTreeMap<FixtureKey, WagerGroup> {
    let mut groups: BTreeMap<FixtureKey, WagerGroup> = BTreeMap::new();
    for wager in wagers {
        groups
            .entry(wager.key)
            .or_insert_with(|| WagerGroup {
                key: wager.key,
                wagers: Vec::new(),
            })
            .wagers
            .push(wager);
    }
    for group in groups.values_mut() {
        group
            .wagers
            .sort_by(|a, b| a.placed_at.cmp(&b.placed_at).then(a.id.cmp(&b.id)));
    }
    groups
}
