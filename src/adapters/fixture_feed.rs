//! HTTP client for the sports-data provider.
//!
//! The provider exposes `/fixtures` (every fixture of the season) and
//! `/bootstrap` (gameweeks and teams). Failures of any kind surface as
//! [`FeedError::Unavailable`]; retrying is left to the next scheduled pass.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::config::FeedConfig;
use crate::domain::{FixtureId, FixtureKey, FixtureStatus, FixtureUpsert, FULL_TIME};
use crate::error::{FeedError, PitchError, Result};
use crate::settlement::FixtureFeed;

/// Raw fixture as served by `/fixtures`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub id: FixtureId,
    pub team_h: u32,
    pub team_a: u32,
    #[serde(default)]
    pub team_h_score: Option<u8>,
    #[serde(default)]
    pub team_a_score: Option<u8>,
    #[serde(default)]
    pub kickoff_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub started: Option<bool>,
    /// Gameweek; null while a postponed fixture is unscheduled
    #[serde(default)]
    pub event: Option<u32>,
}

impl FixtureRecord {
    pub fn key(&self) -> Option<FixtureKey> {
        self.event.map(|gw| FixtureKey::new(gw, self.id))
    }

    pub fn is_started(&self) -> bool {
        self.started.unwrap_or(false)
    }

    /// Lifecycle status as the pool ledger models it
    pub fn status(&self) -> FixtureStatus {
        if self.finished {
            FixtureStatus::Finished
        } else if self.is_started() {
            FixtureStatus::Live
        } else {
            FixtureStatus::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub id: u32,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedTeam {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub short_name: String,
}

/// Document served by `/bootstrap`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bootstrap {
    #[serde(default)]
    pub events: Vec<FeedEvent>,
    #[serde(default)]
    pub teams: Vec<FeedTeam>,
}

impl Bootstrap {
    /// The event flagged current, else the earliest one not yet finished
    pub fn current_period(&self) -> Option<u32> {
        if let Some(event) = self.events.iter().find(|e| e.is_current) {
            return Some(event.id);
        }
        self.events
            .iter()
            .filter(|e| !e.finished)
            .map(|e| e.id)
            .min()
    }

    pub fn team_names(&self) -> HashMap<u32, String> {
        self.teams.iter().map(|t| (t.id, t.name.clone())).collect()
    }
}

/// Ledger upsert for a feed record, if it has been assigned a gameweek
pub fn fixture_upsert(record: &FixtureRecord, team_names: &HashMap<u32, String>) -> Option<FixtureUpsert> {
    let gameweek = record.event?;
    let name = |id: u32| {
        team_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("Team {}", id))
    };
    Some(FixtureUpsert {
        id: record.id,
        gameweek,
        home_team_id: record.team_h,
        away_team_id: record.team_a,
        home_team_name: name(record.team_h),
        away_team_name: name(record.team_a),
        kickoff_time: record.kickoff_time,
        status: record.status(),
    })
}

/// Whether a fixture can be treated as over, and with what score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConclusion {
    pub concluded: bool,
    pub status_code: String,
    pub home_score: u8,
    pub away_score: u8,
    /// Concluded only because kickoff + grace has passed
    pub inferred: bool,
}

impl MatchConclusion {
    pub fn is_full_time(&self) -> bool {
        self.concluded && self.status_code == FULL_TIME
    }
}

/// Decide whether a fixture has concluded.
///
/// A fixture counts as concluded when the feed flags it finished, or when its
/// kickoff is more than `grace` in the past. The second rule covers a stale
/// feed; it also catches postponed or abandoned matches, which then read as
/// 0-0 because the feed has no score for them.
pub fn assess_conclusion(record: &FixtureRecord, now: DateTime<Utc>, grace: Duration) -> MatchConclusion {
    let past_grace = record
        .kickoff_time
        .map(|kickoff| kickoff + grace < now)
        .unwrap_or(false);
    let concluded = record.finished || past_grace;

    let status_code = if concluded {
        FULL_TIME
    } else if record.is_started() {
        "LIVE"
    } else {
        "NS"
    };

    MatchConclusion {
        concluded,
        status_code: status_code.to_string(),
        home_score: record.team_h_score.unwrap_or(0),
        away_score: record.team_a_score.unwrap_or(0),
        inferred: concluded && !record.finished,
    }
}

/// reqwest-backed [`FixtureFeed`]
#[derive(Clone)]
pub struct HttpFixtureFeed {
    http: Client,
    base_url: String,
}

impl HttpFixtureFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("pitchpool-feed/0.1")
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PitchError::Internal(format!("failed to build feed HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str) -> std::result::Result<Value, FeedError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Unavailable(format!("GET {} returned {}", url, status)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FeedError::Unavailable(format!("GET {} returned malformed JSON: {}", url, e)))
    }
}

#[async_trait]
impl FixtureFeed for HttpFixtureFeed {
    #[instrument(skip(self))]
    async fn fetch_all_fixtures(&self) -> std::result::Result<Vec<FixtureRecord>, FeedError> {
        let body = self.get_json("fixtures").await?;
        let fixtures = parse_fixtures(body)?;
        debug!("Fetched {} fixtures from feed", fixtures.len());
        Ok(fixtures)
    }

    #[instrument(skip(self))]
    async fn fetch_bootstrap(&self) -> std::result::Result<Bootstrap, FeedError> {
        let body = self.get_json("bootstrap").await?;
        serde_json::from_value(body)
            .map_err(|e| FeedError::Unavailable(format!("malformed bootstrap payload: {}", e)))
    }
}

fn parse_fixtures(body: Value) -> std::result::Result<Vec<FixtureRecord>, FeedError> {
    if !body.is_array() {
        return Err(FeedError::Unavailable(
            "fixtures payload is not an array".to_string(),
        ));
    }
    serde_json::from_value(body)
        .map_err(|e| FeedError::Unavailable(format!("malformed fixture record: {}", e)))
}
