mod common;

use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

use common::*;
use pitchpool::adapters::{Bootstrap, FixtureRecord};
use pitchpool::domain::{FixtureKey, FixtureStatus, FixtureUpsert, Outcome, Prediction, WagerStatus};
use pitchpool::error::{FeedError, OracleError, SettleError};
use pitchpool::ledger::PoolLedger;
use pitchpool::settlement::{
    Disposition, FixtureFeed, GroupState, MirrorStatus, SettlementOrchestrator,
};

mock! {
    pub Feed {}

    #[async_trait]
    impl FixtureFeed for Feed {
        async fn fetch_all_fixtures(&self) -> Result<Vec<FixtureRecord>, FeedError>;
        async fn fetch_bootstrap(&self) -> Result<Bootstrap, FeedError>;
    }
}

const KEY: FixtureKey = FixtureKey { gameweek: 1, match_id: 10 };

fn pool_wagers(key: FixtureKey) -> Vec<pitchpool::domain::OnLedgerWager> {
    vec![
        wager(0, key, Prediction::Home, dec!(10)),
        wager(1, key, Prediction::Draw, dec!(5)),
        wager(2, key, Prediction::Away, dec!(5)),
    ]
}

fn decimal_detail(value: &serde_json::Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

fn fixture_upsert(id: u32, gameweek: u32) -> FixtureUpsert {
    FixtureUpsert {
        id,
        gameweek,
        home_team_id: 1,
        away_team_id: 2,
        home_team_name: "Arsenal".to_string(),
        away_team_name: "Chelsea".to_string(),
        kickoff_time: None,
        status: FixtureStatus::Pending,
    }
}

struct Harness {
    feed: Arc<FakeFeed>,
    oracle: Arc<FakeOracle>,
    ledger: Arc<FakePayoutLedger>,
}

impl Harness {
    fn new(fixtures: Vec<FixtureRecord>, wagers: Vec<pitchpool::domain::OnLedgerWager>) -> Self {
        let oracle = Arc::new(FakeOracle::new());
        Self {
            feed: Arc::new(FakeFeed::with(fixtures)),
            ledger: Arc::new(FakePayoutLedger::new(oracle.clone(), wagers)),
            oracle,
        }
    }

    fn orchestrator(&self) -> SettlementOrchestrator {
        orchestrator(self.feed.clone(), self.oracle.clone(), self.ledger.clone())
    }
}

#[tokio::test]
async fn test_concluded_fixture_is_submitted_and_settled() {
    let h = Harness::new(vec![finished_record(KEY, 2, 1)], pool_wagers(KEY));

    let summary = h.orchestrator().run_once().await;

    assert!(!summary.is_aborted());
    assert_eq!((summary.processed, summary.settled, summary.errors), (1, 1, 0));
    let job = &summary.details[0];
    assert_eq!(job.match_id, 10);
    assert_eq!(job.wager_count, 3);
    assert_eq!(job.state, GroupState::Settled);
    assert!(job.success);
    assert_eq!(job.details["outcome_source"], json!("feed"));
    assert_eq!(job.details["winning_outcome"], json!("win"));
    assert_eq!(decimal_detail(&job.details["expected_total_payout"]), dec!(19));
    assert_eq!(decimal_detail(&job.details["expected_multiplier"]), dec!(1.9));

    let submissions = h.oracle.submissions.lock().unwrap().clone();
    assert_eq!(submissions, vec![(KEY, 2, 1, "FT".to_string())]);
    assert!(h.ledger.is_settled(KEY));
}

#[tokio::test]
async fn test_fixture_in_progress_is_skipped() {
    let h = Harness::new(vec![live_record(KEY)], pool_wagers(KEY));

    let summary = h.orchestrator().run_once().await;

    assert_eq!((summary.processed, summary.skipped, summary.errors), (1, 1, 0));
    let job = &summary.details[0];
    assert_eq!(job.state, GroupState::NotConcluded);
    assert_eq!(job.disposition, Disposition::Skipped);
    assert!(!job.success);
    assert_eq!(job.details["feed_status"], json!("LIVE"));
    assert_eq!(h.oracle.submission_count(), 0);
    assert_eq!(h.ledger.settle_count(), 0);
}

#[tokio::test]
async fn test_fixture_missing_from_feed_is_skipped() {
    let h = Harness::new(vec![], pool_wagers(KEY));

    let summary = h.orchestrator().run_once().await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.details[0].state, GroupState::NotConcluded);
    assert_eq!(h.ledger.settle_count(), 0);
}

#[tokio::test]
async fn test_lost_submission_race_uses_recorded_score() {
    let h = Harness::new(vec![finished_record(KEY, 2, 1)], pool_wagers(KEY));
    h.oracle
        .racing
        .lock()
        .unwrap()
        .insert(KEY, outcome_record(KEY, 0, 0));

    let summary = h.orchestrator().run_once().await;

    let job = &summary.details[0];
    assert_eq!(job.disposition, Disposition::Settled);
    assert_eq!(job.details["outcome_already_exists"], json!(true));
    assert_eq!(job.details["home_score"], json!(0));
    assert_eq!(job.details["winning_outcome"], json!("draw"));
    assert_eq!(h.oracle.submission_count(), 0);
    assert!(h.ledger.is_settled(KEY));
}

#[tokio::test]
async fn test_already_settled_fixture_is_reported_without_settling() {
    let h = Harness::new(vec![], pool_wagers(KEY));
    h.ledger.settled.lock().unwrap().insert(KEY);

    let summary = h.orchestrator().run_once().await;

    assert_eq!(summary.settled, 1);
    assert_eq!(summary.details[0].details["already_settled"], json!(true));
    assert_eq!(h.ledger.settle_count(), 0);
    assert_eq!(h.feed.fetch_count(), 0);
}

#[tokio::test]
async fn test_recorded_outcome_never_consults_feed() {
    let oracle = Arc::new(FakeOracle::new());
    oracle.record(KEY, 1, 3);
    let ledger = Arc::new(FakePayoutLedger::new(oracle.clone(), pool_wagers(KEY)));

    let mut feed = MockFeed::new();
    feed.expect_fetch_all_fixtures().never();
    feed.expect_fetch_bootstrap().never();

    let orchestrator = SettlementOrchestrator::new(
        Arc::new(feed),
        oracle.clone(),
        ledger.clone(),
        chrono::Duration::minutes(120),
    );
    let summary = orchestrator.run_once().await;

    let job = &summary.details[0];
    assert_eq!(job.disposition, Disposition::Settled);
    assert_eq!(job.details["outcome_source"], json!("oracle"));
    assert_eq!(job.details["winning_outcome"], json!("lose"));
    assert_eq!(oracle.submission_count(), 0);
    assert!(ledger.is_settled(KEY));
}

#[tokio::test]
async fn test_settle_failures_carry_retryability() {
    let other = FixtureKey::new(1, 11);
    let mut wagers = pool_wagers(KEY);
    wagers.push(wager(3, other, Prediction::Home, dec!(4)));
    let h = Harness::new(vec![], wagers);
    h.oracle.record(KEY, 1, 0);
    h.oracle.record(other, 1, 0);
    h.ledger
        .settle_errors
        .lock()
        .unwrap()
        .insert(KEY, SettleError::OutcomeNotAvailable(KEY));
    h.ledger
        .settle_errors
        .lock()
        .unwrap()
        .insert(other, SettleError::Unauthorized);

    let summary = h.orchestrator().run_once().await;

    assert_eq!(summary.errors, 2);
    let by_match = |id: u32| summary.details.iter().find(|j| j.match_id == id).unwrap();
    assert!(by_match(10).retryable);
    assert!(!by_match(11).retryable);
    assert_eq!(by_match(10).details["failed_at"], json!("OUTCOME_CHECKED"));
}

#[tokio::test]
async fn test_one_failing_group_does_not_stop_the_batch() {
    let bad = FixtureKey::new(1, 11);
    let mut wagers = pool_wagers(KEY);
    wagers.push(wager(3, bad, Prediction::Home, dec!(4)));
    let h = Harness::new(
        vec![finished_record(KEY, 2, 1), finished_record(bad, 1, 1)],
        wagers,
    );
    h.ledger
        .settle_errors
        .lock()
        .unwrap()
        .insert(bad, SettleError::Rejected("paused".to_string()));

    let summary = h.orchestrator().run_once().await;

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.settled, 1);
    assert_eq!(summary.errors, 1);
    assert!(h.ledger.is_settled(KEY));
    assert!(!h.ledger.is_settled(bad));
}

#[tokio::test]
async fn test_feed_is_fetched_once_per_pass() {
    let second = FixtureKey::new(1, 11);
    let mut wagers = pool_wagers(KEY);
    wagers.push(wager(3, second, Prediction::Away, dec!(6)));
    let h = Harness::new(
        vec![finished_record(KEY, 2, 1), finished_record(second, 0, 2)],
        wagers,
    );

    let summary = h.orchestrator().run_once().await;

    assert_eq!(summary.settled, 2);
    assert_eq!(h.feed.fetch_count(), 1);
}

#[tokio::test]
async fn test_feed_outage_fails_group_as_retryable() {
    let h = Harness::new(vec![], pool_wagers(KEY));
    *h.feed.fail.lock().unwrap() = Some(FeedError::Unavailable("503".to_string()));

    let summary = h.orchestrator().run_once().await;

    let job = &summary.details[0];
    assert_eq!(job.disposition, Disposition::Failed);
    assert!(job.retryable);
    assert_eq!(h.ledger.settle_count(), 0);
}

#[tokio::test]
async fn test_oracle_unauthorized_is_not_retryable() {
    let h = Harness::new(vec![finished_record(KEY, 2, 1)], pool_wagers(KEY));
    *h.oracle.submit_error.lock().unwrap() = Some(OracleError::Unauthorized);

    let summary = h.orchestrator().run_once().await;

    let job = &summary.details[0];
    assert_eq!(job.disposition, Disposition::Failed);
    assert!(!job.retryable);
    assert_eq!(h.ledger.settle_count(), 0);
}

#[tokio::test]
async fn test_result_past_grace_window_is_flagged_inferred() {
    let mut record = finished_record(KEY, 1, 1);
    record.finished = false;
    let h = Harness::new(vec![record], pool_wagers(KEY));

    let summary = h.orchestrator().run_once().await;

    let job = &summary.details[0];
    assert_eq!(job.disposition, Disposition::Settled);
    assert_eq!(job.details["inferred"], json!(true));
    assert_eq!(job.details["winning_outcome"], json!("draw"));
}

#[tokio::test]
async fn test_missing_authority_aborts_pass() {
    let oracle = Arc::new(FakeOracle::with_authority(false));
    let ledger = Arc::new(FakePayoutLedger::new(oracle.clone(), pool_wagers(KEY)));
    let feed = Arc::new(FakeFeed::with(vec![finished_record(KEY, 2, 1)]));

    let summary = orchestrator(feed.clone(), oracle, ledger.clone()).run_once().await;

    assert!(summary.is_aborted());
    assert_eq!(summary.processed, 0);
    assert_eq!(ledger.settle_count(), 0);
    assert_eq!(feed.fetch_count(), 0);
}

#[tokio::test]
async fn test_preflight_and_discovery_failures_abort_pass() {
    let h = Harness::new(vec![finished_record(KEY, 2, 1)], pool_wagers(KEY));
    *h.ledger.preflight_error.lock().unwrap() = Some(SettleError::InsufficientGas {
        balance: "1".to_string(),
        required: "5000000000000000".to_string(),
    });
    let summary = h.orchestrator().run_once().await;
    assert!(summary.error.as_deref().unwrap().contains("gas"));
    assert_eq!(summary.processed, 0);

    *h.ledger.preflight_error.lock().unwrap() = None;
    *h.ledger.list_error.lock().unwrap() = Some(SettleError::Rpc("connection refused".to_string()));
    let summary = h.orchestrator().run_once().await;
    assert!(summary.error.as_deref().unwrap().starts_with("wager discovery failed"));
    assert_eq!(h.ledger.settle_count(), 0);
}

#[tokio::test]
async fn test_second_pass_finds_nothing_to_do() {
    let h = Harness::new(vec![finished_record(KEY, 2, 1)], pool_wagers(KEY));
    let orchestrator = h.orchestrator();

    let first = orchestrator.run_once().await;
    let second = orchestrator.run_once().await;

    assert_eq!(first.settled, 1);
    assert_eq!(second.processed, 0);
    assert_eq!(h.oracle.submission_count(), 1);
    assert_eq!(h.ledger.settle_count(), 1);
}

#[tokio::test]
async fn test_settled_result_is_mirrored_into_pool_ledger() {
    let h = Harness::new(vec![finished_record(KEY, 2, 1)], pool_wagers(KEY));
    let pools = PoolLedger::in_memory();
    pools.sync_fixture(&fixture_upsert(10, 1)).await.unwrap();
    let winner = pools.place_wager("alice", 10, Outcome::Win, dec!(10)).await.unwrap();
    pools.place_wager("bob", 10, Outcome::Draw, dec!(5)).await.unwrap();
    pools.place_wager("carol", 10, Outcome::Lose, dec!(5)).await.unwrap();

    let orchestrator = h.orchestrator().with_mirror(pools.clone());
    let summary = orchestrator.run_once().await;

    assert_eq!(summary.mirrored.len(), 1);
    assert_eq!(summary.mirrored[0].status, MirrorStatus::Applied);
    let fixture = pools.fixture(10).await.unwrap();
    assert!(fixture.is_payout_processed);
    assert_eq!(fixture.winning_outcome, Some(Outcome::Win));

    let wagers = pools.wagers(10).await.unwrap();
    let alice = wagers.iter().find(|w| w.id == winner.id).unwrap();
    assert_eq!(alice.status, WagerStatus::Won);
    assert_eq!(alice.payout, dec!(19));
    assert!(wagers
        .iter()
        .filter(|w| w.id != winner.id)
        .all(|w| w.status == WagerStatus::Lost && w.payout == Decimal::ZERO));
}

#[tokio::test]
async fn test_mirror_pass_resolves_off_ledger_only_fixtures() {
    let off_ledger = FixtureKey::new(1, 20);
    let h = Harness::new(vec![finished_record(off_ledger, 0, 1)], vec![]);
    let pools = PoolLedger::in_memory();
    pools.sync_fixture(&fixture_upsert(20, 1)).await.unwrap();
    pools.place_wager("alice", 20, Outcome::Lose, dec!(8)).await.unwrap();
    pools.place_wager("bob", 20, Outcome::Win, dec!(12)).await.unwrap();

    let summary = h.orchestrator().with_mirror(pools.clone()).run_once().await;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.mirrored.len(), 1);
    assert_eq!(summary.mirrored[0].fixture_id, 20);
    assert_eq!(summary.mirrored[0].status, MirrorStatus::Applied);
    assert!(pools.pending_payouts().await.unwrap().is_empty());
    assert_eq!(h.oracle.submission_count(), 0);
}

#[tokio::test]
async fn test_mirror_skips_fixture_with_no_winning_stake() {
    let h = Harness::new(vec![finished_record(KEY, 2, 1)], pool_wagers(KEY));
    let pools = PoolLedger::in_memory();
    pools.sync_fixture(&fixture_upsert(10, 1)).await.unwrap();
    pools.place_wager("bob", 10, Outcome::Draw, dec!(5)).await.unwrap();

    let summary = h.orchestrator().with_mirror(pools.clone()).run_once().await;

    assert_eq!(summary.settled, 1);
    assert_eq!(summary.mirrored[0].status, MirrorStatus::Skipped);
    assert!(!pools.fixture(10).await.unwrap().is_payout_processed);
}
