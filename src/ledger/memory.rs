use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ensure_open, CommitOutcome, LedgerResult, PoolStore};
use crate::domain::{
    Fixture, FixtureId, FixtureStatus, FixtureUpsert, Outcome, Wager, WagerSettlement, WagerStatus,
};
use crate::error::LedgerError;

#[derive(Default)]
struct State {
    fixtures: HashMap<FixtureId, Fixture>,
    wagers: HashMap<Uuid, Wager>,
    /// (user, fixture) uniqueness index
    by_user: HashMap<(String, FixtureId), Uuid>,
}

/// [`PoolStore`] held in process memory. A single write lock makes every
/// operation atomic.
#[derive(Default)]
pub struct InMemoryPoolStore {
    state: RwLock<State>,
}

impl InMemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for InMemoryPoolStore {
    async fn upsert_fixture(&self, upsert: &FixtureUpsert) -> LedgerResult<Fixture> {
        let mut state = self.state.write().await;
        let fixture = state
            .fixtures
            .entry(upsert.id)
            .and_modify(|f| f.refresh(upsert))
            .or_insert_with(|| Fixture::from_upsert(upsert));
        Ok(fixture.clone())
    }

    async fn get_fixture(&self, fixture_id: FixtureId) -> LedgerResult<Option<Fixture>> {
        Ok(self.state.read().await.fixtures.get(&fixture_id).cloned())
    }

    async fn insert_wager(&self, wager: &Wager) -> LedgerResult<Fixture> {
        let mut state = self.state.write().await;
        let state = &mut *state;

        let fixture = state
            .fixtures
            .get_mut(&wager.fixture_id)
            .ok_or(LedgerError::FixtureNotFound(wager.fixture_id))?;
        ensure_open(fixture)?;

        let unique_key = (wager.user_id.clone(), wager.fixture_id);
        if state.by_user.contains_key(&unique_key) {
            return Err(LedgerError::DuplicateWager {
                user_id: wager.user_id.clone(),
                fixture_id: wager.fixture_id,
            });
        }

        fixture.pools.add_stake(wager.outcome, wager.amount);
        state.by_user.insert(unique_key, wager.id);
        state.wagers.insert(wager.id, wager.clone());
        Ok(fixture.clone())
    }

    async fn list_wagers(&self, fixture_id: FixtureId) -> LedgerResult<Vec<Wager>> {
        let state = self.state.read().await;
        let mut wagers: Vec<Wager> = state
            .wagers
            .values()
            .filter(|w| w.fixture_id == fixture_id)
            .cloned()
            .collect();
        wagers.sort_by(|a, b| a.placed_at.cmp(&b.placed_at).then(a.id.cmp(&b.id)));
        Ok(wagers)
    }

    async fn record_result(
        &self,
        fixture_id: FixtureId,
        home_score: u8,
        away_score: u8,
    ) -> LedgerResult<Fixture> {
        let mut state = self.state.write().await;
        let fixture = state
            .fixtures
            .get_mut(&fixture_id)
            .ok_or(LedgerError::FixtureNotFound(fixture_id))?;
        if fixture.is_payout_processed {
            return Err(LedgerError::AlreadyProcessed(fixture_id));
        }

        fixture.home_score = Some(home_score);
        fixture.away_score = Some(away_score);
        fixture.status = FixtureStatus::Finished;
        fixture.winning_outcome = Some(Outcome::from_scores(home_score, away_score));
        Ok(fixture.clone())
    }

    async fn commit_payout(
        &self,
        fixture_id: FixtureId,
        expected: Outcome,
        settlements: &[WagerSettlement],
    ) -> LedgerResult<CommitOutcome> {
        let mut state = self.state.write().await;
        let state = &mut *state;

        let fixture = state
            .fixtures
            .get_mut(&fixture_id)
            .ok_or(LedgerError::FixtureNotFound(fixture_id))?;
        if fixture.is_payout_processed {
            return Ok(CommitOutcome::AlreadyProcessed);
        }
        if fixture.winning_outcome != Some(expected) {
            return Ok(CommitOutcome::ResultChanged);
        }

        let now = Utc::now();
        for settlement in settlements {
            if let Some(wager) = state.wagers.get_mut(&settlement.wager_id) {
                if wager.status == WagerStatus::Pending {
                    wager.status = settlement.status;
                    wager.payout = settlement.payout;
                    wager.settled_at = Some(now);
                }
            }
        }
        fixture.is_payout_processed = true;
        Ok(CommitOutcome::Committed)
    }

    async fn pending_payout_fixtures(&self) -> LedgerResult<Vec<Fixture>> {
        let state = self.state.read().await;
        let mut fixtures: Vec<Fixture> = state
            .fixtures
            .values()
            .filter(|f| !f.is_payout_processed && f.pools.bet_count() > 0)
            .cloned()
            .collect();
        fixtures.sort_by_key(|f| f.id);
        Ok(fixtures)
    }
}
