//! Batch settlement driver.
//!
//! One pass: verify the authority, enumerate unsettled on-ledger wagers,
//! group them by fixture, and walk each group through
//! oracle check → feed check → outcome submission → settlement → mirror.
//! Groups run one after another; a failing group never aborts the batch.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use super::discovery::{group_by_fixture, WagerGroup};
use super::payout::{compute_from_scores, pools_from_positions};
use super::traits::{FixtureFeed, OutcomeOracle, OutcomeSubmission, PayoutLedger};
use crate::adapters::fixture_feed::{assess_conclusion, FixtureRecord};
use crate::domain::{Fixture, FixtureId, FixtureKey, FULL_TIME};
use crate::error::{FeedError, LedgerError, OracleError, SettleError};
use crate::ledger::{PayoutSummary, PoolLedger};

/// Where a group ended up in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupState {
    Discovered,
    OutcomeChecked,
    OutcomeMissing,
    FeedChecked,
    NotConcluded,
    ResultSubmitted,
    Settled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Settled,
    Skipped,
    Failed,
}

/// Report for one fixture group within a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementJob {
    pub gameweek: u32,
    pub match_id: FixtureId,
    pub wager_count: usize,
    pub state: GroupState,
    pub disposition: Disposition,
    pub retryable: bool,
    pub success: bool,
    pub message: String,
    pub details: Value,
}

impl SettlementJob {
    fn new(key: FixtureKey, wager_count: usize) -> Self {
        Self {
            gameweek: key.gameweek,
            match_id: key.match_id,
            wager_count,
            state: GroupState::Discovered,
            disposition: Disposition::Skipped,
            retryable: false,
            success: false,
            message: String::new(),
            details: json!({}),
        }
    }

    pub fn key(&self) -> FixtureKey {
        FixtureKey::new(self.gameweek, self.match_id)
    }

    fn detail(&mut self, field: &str, value: Value) {
        if let Value::Object(map) = &mut self.details {
            map.insert(field.to_string(), value);
        }
    }

    fn settled(mut self, message: impl Into<String>) -> Self {
        self.state = GroupState::Settled;
        self.disposition = Disposition::Settled;
        self.success = true;
        self.message = message.into();
        self
    }

    fn not_concluded(mut self, message: impl Into<String>) -> Self {
        self.state = GroupState::NotConcluded;
        self.disposition = Disposition::Skipped;
        self.message = message.into();
        self
    }

    fn failed(mut self, message: impl Into<String>, retryable: bool) -> Self {
        self.detail("failed_at", json!(self.state));
        self.state = GroupState::Failed;
        self.disposition = Disposition::Failed;
        self.retryable = retryable;
        self.success = false;
        self.message = message.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorStatus {
    Applied,
    Skipped,
    Failed,
}

/// Result of feeding one fixture's result into the pool ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorReport {
    pub fixture_id: FixtureId,
    pub status: MirrorStatus,
    pub message: String,
    pub summary: Option<PayoutSummary>,
}

impl MirrorReport {
    fn skipped(fixture_id: FixtureId, message: impl Into<String>) -> Self {
        Self {
            fixture_id,
            status: MirrorStatus::Skipped,
            message: message.into(),
            summary: None,
        }
    }

    fn failed(fixture_id: FixtureId, message: impl Into<String>) -> Self {
        Self {
            fixture_id,
            status: MirrorStatus::Failed,
            message: message.into(),
            summary: None,
        }
    }
}

/// Report for one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub settled: usize,
    pub skipped: usize,
    pub errors: usize,
    pub details: Vec<SettlementJob>,
    pub mirrored: Vec<MirrorReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set only when the pass was aborted before any group ran
    pub error: Option<String>,
}

impl BatchSummary {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            processed: 0,
            settled: 0,
            skipped: 0,
            errors: 0,
            details: Vec::new(),
            mirrored: Vec::new(),
            started_at: now,
            finished_at: now,
            error: None,
        }
    }

    /// Summary of a pass that could not start
    pub fn aborted(message: impl Into<String>) -> Self {
        let mut summary = Self::start();
        summary.error = Some(message.into());
        summary
    }

    fn record(&mut self, job: SettlementJob) {
        self.processed += 1;
        match job.disposition {
            Disposition::Settled => self.settled += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::Failed => self.errors += 1,
        }
        self.details.push(job);
    }

    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }
}

type FeedSnapshot = std::result::Result<Vec<FixtureRecord>, FeedError>;

pub struct SettlementOrchestrator {
    feed: Arc<dyn FixtureFeed>,
    oracle: Arc<dyn OutcomeOracle>,
    ledger: Arc<dyn PayoutLedger>,
    mirror: Option<PoolLedger>,
    grace: Duration,
}

impl SettlementOrchestrator {
    pub fn new(
        feed: Arc<dyn FixtureFeed>,
        oracle: Arc<dyn OutcomeOracle>,
        ledger: Arc<dyn PayoutLedger>,
        grace: Duration,
    ) -> Self {
        Self {
            feed,
            oracle,
            ledger,
            mirror: None,
            grace,
        }
    }

    /// Also resolve off-ledger wagers in this pool ledger
    pub fn with_mirror(mut self, mirror: PoolLedger) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn can_submit(&self) -> bool {
        self.oracle.can_submit()
    }

    /// Run one settlement pass
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> BatchSummary {
        if !self.oracle.can_submit() {
            let err = OracleError::AuthorityMissing;
            error!("Settlement pass aborted: {}", err);
            return BatchSummary::aborted(err.to_string());
        }

        if let Err(e) = self.ledger.preflight().await {
            error!("Settlement pass aborted at preflight: {}", e);
            return BatchSummary::aborted(e.to_string());
        }

        let wagers = match self.ledger.list_unsettled_wagers().await {
            Ok(wagers) => wagers,
            Err(e) => {
                error!("Settlement pass aborted: wager discovery failed: {}", e);
                return BatchSummary::aborted(format!("wager discovery failed: {}", e));
            }
        };

        let groups = group_by_fixture(wagers);
        info!("Settlement pass: {} fixture group(s) with unsettled wagers", groups.len());

        let snapshot: OnceCell<FeedSnapshot> = OnceCell::new();
        let mut summary = BatchSummary::start();
        let mut mirrored_ids: HashSet<FixtureId> = HashSet::new();

        for group in groups.values() {
            let (job, result) = self.process_group(group, &snapshot).await;
            match job.disposition {
                Disposition::Settled => info!("{}: {}", group.key, job.message),
                Disposition::Skipped => debug!("{} skipped: {}", group.key, job.message),
                Disposition::Failed => warn!(
                    "{} failed (retryable: {}): {}",
                    group.key, job.retryable, job.message
                ),
            }

            if let (Some(mirror), Some((home, away))) = (&self.mirror, result) {
                let report = self.mirror_result(mirror, group.key.match_id, home, away).await;
                mirrored_ids.insert(report.fixture_id);
                summary.mirrored.push(report);
            }

            summary.record(job);
        }

        if let Some(mirror) = &self.mirror {
            self.mirror_pass(mirror, &snapshot, &mirrored_ids, &mut summary).await;
        }

        summary.finished_at = Utc::now();
        info!(
            "Settlement pass done: processed={} settled={} skipped={} errors={} mirrored={}",
            summary.processed,
            summary.settled,
            summary.skipped,
            summary.errors,
            summary.mirrored.len()
        );
        summary
    }

    async fn feed_snapshot<'a>(&self, cell: &'a OnceCell<FeedSnapshot>) -> &'a FeedSnapshot {
        cell.get_or_init(|| async {
            let fetched = self.feed.fetch_all_fixtures().await;
            if let Err(e) = &fetched {
                warn!("Fixture feed unavailable for this pass: {}", e);
            }
            fetched
        })
        .await
    }

    /// Drive one group. Returns its report and the final score when one is
    /// known, so the caller can mirror it.
    #[instrument(skip(self, group, snapshot), fields(fixture = %group.key, wagers = group.wager_count()))]
    async fn process_group(
        &self,
        group: &WagerGroup,
        snapshot: &OnceCell<FeedSnapshot>,
    ) -> (SettlementJob, Option<(u8, u8)>) {
        let key = group.key;
        let mut job = SettlementJob::new(key, group.wager_count());
        if let Some(opener) = group.opener() {
            job.detail("opened_at", json!(opener.placed_at));
        }

        match self.ledger.is_fixture_settled(key).await {
            Ok(true) => {
                job.detail("already_settled", json!(true));
                let score = match self.oracle.get_outcome(key).await {
                    Ok(record) => Some((record.home_score, record.away_score)),
                    Err(_) => None,
                };
                return (job.settled("fixture already settled"), score);
            }
            Ok(false) => {}
            Err(e) => {
                let retryable = e.is_transient();
                return (job.failed(format!("settlement check failed: {}", e), retryable), None);
            }
        }

        let (home, away) = match self.oracle.has_outcome(key).await {
            Ok(true) => match self.oracle.get_outcome(key).await {
                Ok(record) => {
                    job.state = GroupState::OutcomeChecked;
                    job.detail("outcome_source", json!("oracle"));
                    (record.home_score, record.away_score)
                }
                Err(e) => {
                    let retryable = e.is_transient();
                    return (job.failed(format!("outcome read failed: {}", e), retryable), None);
                }
            },
            Ok(false) => {
                job.state = GroupState::OutcomeMissing;
                match self.resolve_from_feed(key, snapshot, &mut job).await {
                    Ok(Some(score)) => score,
                    Ok(None) => return (job, None),
                    Err(failed) => return (failed, None),
                }
            }
            Err(e) => {
                let retryable = e.is_transient();
                return (job.failed(format!("outcome check failed: {}", e), retryable), None);
            }
        };

        job.detail("home_score", json!(home));
        job.detail("away_score", json!(away));

        let pools = pools_from_positions(group.positions().iter());
        if let Some(preview) = compute_from_scores(home, away, &pools) {
            job.detail("winning_outcome", json!(preview.winning_outcome));
            job.detail("expected_multiplier", json!(preview.multiplier()));
            job.detail("expected_total_payout", json!(preview.total_payout));
        }

        match self.ledger.settle(key).await {
            Ok(receipt) => {
                job.detail("settle_tx", json!(receipt.receipt.tx_hash));
                if let Some(total) = receipt.total_payout {
                    job.detail("total_payout", json!(total));
                }
                (job.settled("settled"), Some((home, away)))
            }
            Err(SettleError::AlreadySettled(_)) => {
                job.detail("already_settled", json!(true));
                (job.settled("fixture already settled"), Some((home, away)))
            }
            Err(e) => {
                if matches!(e, SettleError::Unauthorized) {
                    error!("Settlement authority is not authorized on the payout ledger");
                }
                let retryable = e.is_transient();
                (job.failed(e.to_string(), retryable), Some((home, away)))
            }
        }
    }

    /// No outcome on the oracle yet: consult the feed and submit the result.
    ///
    /// `Ok(None)` means the group was skipped and `job` holds the reason.
    async fn resolve_from_feed(
        &self,
        key: FixtureKey,
        snapshot: &OnceCell<FeedSnapshot>,
        job: &mut SettlementJob,
    ) -> std::result::Result<Option<(u8, u8)>, SettlementJob> {
        let records = match self.feed_snapshot(snapshot).await {
            Ok(records) => records,
            Err(e) => return Err(job.clone().failed(e.to_string(), true)),
        };

        let Some(record) = records.iter().find(|r| r.key() == Some(key)) else {
            *job = job.clone().not_concluded("fixture not found in feed");
            return Ok(None);
        };

        let conclusion = assess_conclusion(record, Utc::now(), self.grace);
        job.state = GroupState::FeedChecked;
        job.detail("feed_status", json!(conclusion.status_code));

        if !conclusion.concluded || conclusion.status_code != FULL_TIME {
            *job = job
                .clone()
                .not_concluded(format!("fixture not concluded ({})", conclusion.status_code));
            return Ok(None);
        }

        if conclusion.inferred {
            warn!(
                "{}: feed has not flagged the fixture finished; treating {}-{} as final after the grace window",
                key, conclusion.home_score, conclusion.away_score
            );
            job.detail("inferred", json!(true));
        }

        let submission = self
            .oracle
            .submit_outcome(key, conclusion.home_score, conclusion.away_score, &conclusion.status_code)
            .await;

        match submission {
            Ok(OutcomeSubmission::Submitted(receipt)) => {
                job.state = GroupState::ResultSubmitted;
                job.detail("outcome_source", json!("feed"));
                job.detail("outcome_tx", json!(receipt.tx_hash));
                Ok(Some((conclusion.home_score, conclusion.away_score)))
            }
            Ok(OutcomeSubmission::AlreadyExists(existing)) => {
                job.state = GroupState::ResultSubmitted;
                job.detail("outcome_source", json!("oracle"));
                job.detail("outcome_already_exists", json!(true));
                Ok(Some((existing.home_score, existing.away_score)))
            }
            Err(e) => {
                if matches!(e, OracleError::Unauthorized) {
                    error!("Settlement authority is not authorized on the outcome oracle");
                }
                let retryable = e.is_transient();
                Err(job.clone().failed(format!("outcome submission failed: {}", e), retryable))
            }
        }
    }

    async fn mirror_result(
        &self,
        mirror: &PoolLedger,
        fixture_id: FixtureId,
        home: u8,
        away: u8,
    ) -> MirrorReport {
        match mirror.ingest_result(fixture_id, home, away).await {
            Ok(_) | Err(LedgerError::AlreadyProcessed(_)) => {}
            Err(LedgerError::FixtureNotFound(_)) => {
                return MirrorReport::skipped(fixture_id, "fixture not tracked by the pool ledger")
            }
            Err(e) => return MirrorReport::failed(fixture_id, e.to_string()),
        }

        match mirror.apply_payout(fixture_id).await {
            Ok(summary) => MirrorReport {
                fixture_id,
                status: MirrorStatus::Applied,
                message: format!(
                    "{} won, {} lost at {}x",
                    summary.winning_count, summary.losing_count, summary.payout_multiplier
                ),
                summary: Some(summary),
            },
            Err(LedgerError::NoEligiblePayout(_)) => {
                MirrorReport::skipped(fixture_id, "winning pool is empty; payout not applied")
            }
            Err(e) => {
                warn!("Mirror payout for fixture {} failed: {}", fixture_id, e);
                MirrorReport::failed(fixture_id, e.to_string())
            }
        }
    }

    /// Resolve pool ledger fixtures that had no on-ledger group this pass
    async fn mirror_pass(
        &self,
        mirror: &PoolLedger,
        snapshot: &OnceCell<FeedSnapshot>,
        already: &HashSet<FixtureId>,
        summary: &mut BatchSummary,
    ) {
        let pending = match mirror.pending_payouts().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Could not list pending pool ledger payouts: {}", e);
                return;
            }
        };

        for fixture in pending.iter().filter(|f| !already.contains(&f.id)) {
            if let Some((home, away)) = self.known_result(fixture, snapshot).await {
                let report = self.mirror_result(mirror, fixture.id, home, away).await;
                summary.mirrored.push(report);
            }
        }
    }

    async fn known_result(
        &self,
        fixture: &Fixture,
        snapshot: &OnceCell<FeedSnapshot>,
    ) -> Option<(u8, u8)> {
        // A previous pass ingested the result but could not apply it
        if let Some(score) = fixture.final_score() {
            return Some(score);
        }

        let key = FixtureKey::new(fixture.gameweek, fixture.id);
        match self.oracle.has_outcome(key).await {
            Ok(true) => match self.oracle.get_outcome(key).await {
                Ok(record) if record.is_full_time() => {
                    return Some((record.home_score, record.away_score))
                }
                Ok(_) => {}
                Err(e) => debug!("Oracle read for {} failed: {}", key, e),
            },
            Ok(false) => {}
            Err(e) => debug!("Oracle check for {} failed: {}", key, e),
        }

        let records = self.feed_snapshot(snapshot).await.as_ref().ok()?;
        let record = records.iter().find(|r| r.id == fixture.id)?;
        let conclusion = assess_conclusion(record, Utc::now(), self.grace);
        if !conclusion.is_full_time() {
            return None;
        }
        if conclusion.inferred {
            warn!(
                "Fixture {}: mirroring inferred result {}-{} after the grace window",
                fixture.id, conclusion.home_score, conclusion.away_score
            );
        }
        Some((conclusion.home_score, conclusion.away_score))
    }
}
