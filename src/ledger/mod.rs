//! Off-ledger pool ledger.
//!
//! Mirrors fixtures from the feed, accepts one wager per user and fixture,
//! and applies pari-mutuel payouts once a result is ingested. Storage is
//! behind [`PoolStore`]; every check that must hold under concurrency is
//! repeated by the store inside its own atomic section.

pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::adapters::fixture_feed::fixture_upsert;
use crate::domain::{
    Fixture, FixtureId, FixtureStatus, FixtureUpsert, Outcome, Wager, WagerSettlement, WagerStatus,
};
use crate::error::LedgerError;
use crate::settlement::payout::{compute_payout, PayoutInfo};
use crate::settlement::FixtureFeed;

pub use memory::InMemoryPoolStore;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Durable storage for fixtures and off-ledger wagers
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Create the fixture or refresh its schedule data
    async fn upsert_fixture(&self, upsert: &FixtureUpsert) -> LedgerResult<Fixture>;

    async fn get_fixture(&self, fixture_id: FixtureId) -> LedgerResult<Option<Fixture>>;

    /// Insert a wager and add its stake to the fixture pool in one step.
    ///
    /// Fails `FixtureNotFound`, `FixtureClosed` or `DuplicateWager`.
    async fn insert_wager(&self, wager: &Wager) -> LedgerResult<Fixture>;

    async fn list_wagers(&self, fixture_id: FixtureId) -> LedgerResult<Vec<Wager>>;

    /// Store the final score and mark the fixture finished.
    ///
    /// Fails `AlreadyProcessed` once payouts have been applied.
    async fn record_result(
        &self,
        fixture_id: FixtureId,
        home_score: u8,
        away_score: u8,
    ) -> LedgerResult<Fixture>;

    /// Apply wager settlements and set the processed flag in one step.
    ///
    /// Writes nothing unless the flag is clear and the stored winning outcome
    /// is still `expected`.
    async fn commit_payout(
        &self,
        fixture_id: FixtureId,
        expected: Outcome,
        settlements: &[WagerSettlement],
    ) -> LedgerResult<CommitOutcome>;

    /// Fixtures holding wagers whose payout has not been applied
    async fn pending_payout_fixtures(&self) -> LedgerResult<Vec<Fixture>>;
}

/// Result of a guarded payout commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Another pass set the processed flag first
    AlreadyProcessed,
    /// The result was re-ingested after the payout was computed
    ResultChanged,
}

/// Attempts at computing and committing a payout before giving up on a
/// result that keeps changing underneath
const COMMIT_ATTEMPTS: usize = 3;

/// Outcome of a payout pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutSummary {
    pub fixture_id: FixtureId,
    pub winning_outcome: Outcome,
    pub total_pool: Decimal,
    pub winning_pool: Decimal,
    pub winning_count: u32,
    pub losing_count: u32,
    pub payout_multiplier: Decimal,
}

impl PayoutSummary {
    fn new(fixture_id: FixtureId, info: &PayoutInfo, winning_count: u32, losing_count: u32) -> Self {
        Self {
            fixture_id,
            winning_outcome: info.winning_outcome,
            total_pool: info.total_pool,
            winning_pool: info.winning_pool,
            winning_count,
            losing_count,
            payout_multiplier: info.multiplier(),
        }
    }
}

/// Reject wagers on fixtures that can no longer take them
pub fn ensure_open(fixture: &Fixture) -> LedgerResult<()> {
    if fixture.status.accepts_wagers() && !fixture.is_payout_processed {
        Ok(())
    } else {
        Err(LedgerError::FixtureClosed(fixture.id))
    }
}

/// Won/lost assignment for every pending wager on a fixture
pub fn settle_wagers(info: &PayoutInfo, wagers: &[Wager]) -> Vec<WagerSettlement> {
    wagers
        .iter()
        .filter(|w| w.status == WagerStatus::Pending)
        .map(|w| {
            if info.is_winner(w.outcome) {
                WagerSettlement {
                    wager_id: w.id,
                    status: WagerStatus::Won,
                    payout: info.payout_for_stake(w.outcome, w.amount),
                }
            } else {
                WagerSettlement {
                    wager_id: w.id,
                    status: WagerStatus::Lost,
                    payout: Decimal::ZERO,
                }
            }
        })
        .collect()
}

/// Service facade over a [`PoolStore`]
#[derive(Clone)]
pub struct PoolLedger {
    store: Arc<dyn PoolStore>,
}

impl PoolLedger {
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self { store }
    }

    /// Ledger on a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryPoolStore::new()))
    }

    pub async fn sync_fixture(&self, upsert: &FixtureUpsert) -> LedgerResult<Fixture> {
        self.store.upsert_fixture(upsert).await
    }

    /// Sync every scheduled fixture from the feed. Returns how many were synced.
    #[instrument(skip(self, feed))]
    pub async fn sync_from_feed(&self, feed: &dyn FixtureFeed) -> crate::error::Result<usize> {
        let bootstrap = feed.fetch_bootstrap().await?;
        let records = feed.fetch_all_fixtures().await?;
        let names = bootstrap.team_names();

        let mut synced = 0;
        for record in &records {
            let Some(upsert) = fixture_upsert(record, &names) else {
                debug!("Fixture {} has no gameweek yet, not syncing", record.id);
                continue;
            };
            self.store.upsert_fixture(&upsert).await?;
            synced += 1;
        }

        info!("Synced {} of {} feed fixtures into the pool ledger", synced, records.len());
        Ok(synced)
    }

    pub async fn fixture(&self, fixture_id: FixtureId) -> LedgerResult<Fixture> {
        self.store
            .get_fixture(fixture_id)
            .await?
            .ok_or(LedgerError::FixtureNotFound(fixture_id))
    }

    pub async fn wagers(&self, fixture_id: FixtureId) -> LedgerResult<Vec<Wager>> {
        self.store.list_wagers(fixture_id).await
    }

    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn place_wager(
        &self,
        user_id: &str,
        fixture_id: FixtureId,
        outcome: Outcome,
        amount: Decimal,
    ) -> LedgerResult<Wager> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let fixture = self.fixture(fixture_id).await?;
        ensure_open(&fixture)?;

        let wager = Wager::new(user_id, fixture_id, outcome, amount);
        self.store.insert_wager(&wager).await?;

        debug!("Wager {} placed: {} on {} for {}", wager.id, user_id, fixture_id, outcome);
        Ok(wager)
    }

    #[instrument(skip(self))]
    pub async fn ingest_result(
        &self,
        fixture_id: FixtureId,
        home_score: u8,
        away_score: u8,
    ) -> LedgerResult<Fixture> {
        let fixture = self.store.record_result(fixture_id, home_score, away_score).await?;
        info!(
            "Result ingested for fixture {}: {}-{} ({:?})",
            fixture_id, home_score, away_score, fixture.winning_outcome
        );
        Ok(fixture)
    }

    /// Apply payouts for a finished fixture. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub async fn apply_payout(&self, fixture_id: FixtureId) -> LedgerResult<PayoutSummary> {
        for attempt in 1..=COMMIT_ATTEMPTS {
            let fixture = self.fixture(fixture_id).await?;

            if fixture.is_payout_processed {
                return self.recompute_summary(&fixture).await;
            }

            if fixture.status != FixtureStatus::Finished || fixture.final_score().is_none() {
                return Err(LedgerError::ResultPending(fixture_id));
            }

            let info = compute_payout(&fixture).ok_or(LedgerError::NoEligiblePayout(fixture_id))?;

            let wagers = self.store.list_wagers(fixture_id).await?;
            let settlements = settle_wagers(&info, &wagers);

            match self
                .store
                .commit_payout(fixture_id, info.winning_outcome, &settlements)
                .await?
            {
                CommitOutcome::Committed => {}
                CommitOutcome::AlreadyProcessed => {
                    warn!("Payout for fixture {} was applied concurrently", fixture_id);
                    let fixture = self.fixture(fixture_id).await?;
                    return self.recompute_summary(&fixture).await;
                }
                CommitOutcome::ResultChanged => {
                    warn!(
                        "Result for fixture {} changed before payout commit (attempt {}/{})",
                        fixture_id, attempt, COMMIT_ATTEMPTS
                    );
                    continue;
                }
            }

            let winning_count = settlements
                .iter()
                .filter(|s| s.status == WagerStatus::Won)
                .count() as u32;
            let losing_count = settlements.len() as u32 - winning_count;

            info!(
                "Payout applied for fixture {}: {} won, {} lost, multiplier {}",
                fixture_id,
                winning_count,
                losing_count,
                info.multiplier()
            );
            return Ok(PayoutSummary::new(fixture_id, &info, winning_count, losing_count));
        }

        Err(LedgerError::ResultPending(fixture_id))
    }

    /// Fixtures with wagers still waiting on a payout pass
    pub async fn pending_payouts(&self) -> LedgerResult<Vec<Fixture>> {
        self.store.pending_payout_fixtures().await
    }

    async fn recompute_summary(&self, fixture: &Fixture) -> LedgerResult<PayoutSummary> {
        let info = compute_payout(fixture).ok_or(LedgerError::NoEligiblePayout(fixture.id))?;
        let wagers = self.store.list_wagers(fixture.id).await?;
        let count = |status: WagerStatus| wagers.iter().filter(|w| w.status == status).count() as u32;
        Ok(PayoutSummary::new(
            fixture.id,
            &info,
            count(WagerStatus::Won),
            count(WagerStatus::Lost),
        ))
    }
}
