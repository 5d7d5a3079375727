//! In-process fakes for the three settlement collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pitchpool::adapters::{Bootstrap, FixtureRecord};
use pitchpool::domain::{
    FixtureKey, OnLedgerWager, OutcomeRecord, Prediction, TxReceipt, FULL_TIME,
};
use pitchpool::error::{FeedError, OracleError, SettleError};
use pitchpool::settlement::{
    FixtureFeed, OutcomeOracle, OutcomeSubmission, PayoutLedger, SettlementOrchestrator,
    SettlementReceipt,
};

pub fn receipt(tag: &str) -> TxReceipt {
    TxReceipt {
        tx_hash: format!("0x{}", tag),
        block_number: Some(1),
        gas_used: 21_000,
    }
}

pub fn outcome_record(key: FixtureKey, home: u8, away: u8) -> OutcomeRecord {
    OutcomeRecord {
        key,
        home_score: home,
        away_score: away,
        status: FULL_TIME.to_string(),
        recorded_at: Some(Utc::now()),
        exists: true,
    }
}

/// Feed record that kicked off three hours ago and is flagged finished
pub fn finished_record(key: FixtureKey, home: u8, away: u8) -> FixtureRecord {
    FixtureRecord {
        id: key.match_id,
        team_h: 1,
        team_a: 2,
        team_h_score: Some(home),
        team_a_score: Some(away),
        kickoff_time: Some(Utc::now() - Duration::hours(3)),
        finished: true,
        started: Some(true),
        event: Some(key.gameweek),
    }
}

/// Feed record for a match in its first half
pub fn live_record(key: FixtureKey) -> FixtureRecord {
    FixtureRecord {
        id: key.match_id,
        team_h: 1,
        team_a: 2,
        team_h_score: Some(0),
        team_a_score: Some(0),
        kickoff_time: Some(Utc::now() - Duration::minutes(30)),
        finished: false,
        started: Some(true),
        event: Some(key.gameweek),
    }
}

pub fn wager(id: u64, key: FixtureKey, prediction: Prediction, amount: Decimal) -> OnLedgerWager {
    OnLedgerWager {
        id,
        bettor: format!("0x{:040x}", id + 1),
        key,
        prediction,
        amount,
        is_settled: false,
        is_winner: false,
        placed_at: Utc::now() - Duration::hours(4) + Duration::seconds(id as i64),
    }
}

#[derive(Default)]
pub struct FakeFeed {
    pub fixtures: Mutex<Vec<FixtureRecord>>,
    pub bootstrap: Mutex<Bootstrap>,
    pub fail: Mutex<Option<FeedError>>,
    pub fetches: AtomicUsize,
}

impl FakeFeed {
    pub fn with(fixtures: Vec<FixtureRecord>) -> Self {
        Self {
            fixtures: Mutex::new(fixtures),
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FixtureFeed for FakeFeed {
    async fn fetch_all_fixtures(&self) -> Result<Vec<FixtureRecord>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.fixtures.lock().unwrap().clone())
    }

    async fn fetch_bootstrap(&self) -> Result<Bootstrap, FeedError> {
        Ok(self.bootstrap.lock().unwrap().clone())
    }
}

pub struct FakeOracle {
    pub authority: bool,
    pub outcomes: Mutex<HashMap<FixtureKey, OutcomeRecord>>,
    /// Outcomes another submitter writes between our check and our submit
    pub racing: Mutex<HashMap<FixtureKey, OutcomeRecord>>,
    pub submit_error: Mutex<Option<OracleError>>,
    pub submissions: Mutex<Vec<(FixtureKey, u8, u8, String)>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::with_authority(true)
    }

    pub fn with_authority(authority: bool) -> Self {
        Self {
            authority,
            outcomes: Mutex::new(HashMap::new()),
            racing: Mutex::new(HashMap::new()),
            submit_error: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, key: FixtureKey, home: u8, away: u8) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(key, outcome_record(key, home, away));
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl OutcomeOracle for FakeOracle {
    fn can_submit(&self) -> bool {
        self.authority
    }

    async fn has_outcome(&self, key: FixtureKey) -> Result<bool, OracleError> {
        Ok(self.outcomes.lock().unwrap().contains_key(&key))
    }

    async fn get_outcome(&self, key: FixtureKey) -> Result<OutcomeRecord, OracleError> {
        self.outcomes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(OracleError::NotFound(key))
    }

    async fn submit_outcome(
        &self,
        key: FixtureKey,
        home_score: u8,
        away_score: u8,
        status: &str,
    ) -> Result<OutcomeSubmission, OracleError> {
        if let Some(err) = self.submit_error.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(existing) = self.racing.lock().unwrap().remove(&key) {
            self.outcomes.lock().unwrap().insert(key, existing.clone());
            return Ok(OutcomeSubmission::AlreadyExists(existing));
        }

        let mut outcomes = self.outcomes.lock().unwrap();
        if let Some(existing) = outcomes.get(&key) {
            return Ok(OutcomeSubmission::AlreadyExists(existing.clone()));
        }
        outcomes.insert(key, outcome_record(key, home_score, away_score));
        self.submissions
            .lock()
            .unwrap()
            .push((key, home_score, away_score, status.to_string()));
        Ok(OutcomeSubmission::Submitted(receipt("outcome")))
    }
}

pub struct FakePayoutLedger {
    pub oracle: Arc<FakeOracle>,
    pub wagers: Mutex<Vec<OnLedgerWager>>,
    pub settled: Mutex<HashSet<FixtureKey>>,
    pub settle_errors: Mutex<HashMap<FixtureKey, SettleError>>,
    pub preflight_error: Mutex<Option<SettleError>>,
    pub list_error: Mutex<Option<SettleError>>,
    pub settle_calls: Mutex<Vec<FixtureKey>>,
}

impl FakePayoutLedger {
    pub fn new(oracle: Arc<FakeOracle>, wagers: Vec<OnLedgerWager>) -> Self {
        Self {
            oracle,
            wagers: Mutex::new(wagers),
            settled: Mutex::new(HashSet::new()),
            settle_errors: Mutex::new(HashMap::new()),
            preflight_error: Mutex::new(None),
            list_error: Mutex::new(None),
            settle_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn is_settled(&self, key: FixtureKey) -> bool {
        self.settled.lock().unwrap().contains(&key)
    }

    pub fn settle_count(&self) -> usize {
        self.settle_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PayoutLedger for FakePayoutLedger {
    async fn preflight(&self) -> Result<(), SettleError> {
        match self.preflight_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn list_unsettled_wagers(&self) -> Result<Vec<OnLedgerWager>, SettleError> {
        if let Some(err) = self.list_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self
            .wagers
            .lock()
            .unwrap()
            .iter()
            .filter(|w| !w.is_settled)
            .cloned()
            .collect())
    }

    async fn is_fixture_settled(&self, key: FixtureKey) -> Result<bool, SettleError> {
        Ok(self.is_settled(key))
    }

    async fn settle(&self, key: FixtureKey) -> Result<SettlementReceipt, SettleError> {
        self.settle_calls.lock().unwrap().push(key);
        if let Some(err) = self.settle_errors.lock().unwrap().get(&key).cloned() {
            return Err(err);
        }
        if self.is_settled(key) {
            return Err(SettleError::AlreadySettled(key));
        }
        let record = self
            .oracle
            .outcomes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(SettleError::OutcomeNotAvailable(key))?;
        let winning = record.winning_outcome();

        let mut wagers = self.wagers.lock().unwrap();
        for w in wagers.iter_mut().filter(|w| w.key == key) {
            w.is_settled = true;
            w.is_winner = w.prediction.outcome() == winning;
        }
        self.settled.lock().unwrap().insert(key);

        Ok(SettlementReceipt {
            receipt: receipt("settle"),
            outcome: Some(winning),
            total_payout: None,
        })
    }
}

/// Orchestrator over the three fakes with a two-hour grace window
pub fn orchestrator(
    feed: Arc<FakeFeed>,
    oracle: Arc<FakeOracle>,
    ledger: Arc<FakePayoutLedger>,
) -> SettlementOrchestrator {
    SettlementOrchestrator::new(feed, oracle, ledger, Duration::minutes(120))
}
