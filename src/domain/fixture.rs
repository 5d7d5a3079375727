use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// External fixture id as issued by the sports-data feed
pub type FixtureId = u32;

/// Predicted or winning outcome, always relative to the home side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Home side wins
    Win,
    Draw,
    /// Away side wins
    Lose,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Win, Outcome::Draw, Outcome::Lose];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Draw => "draw",
            Outcome::Lose => "lose",
        }
    }

    /// Outcome implied by a final score
    pub fn from_scores(home_score: u8, away_score: u8) -> Self {
        if home_score > away_score {
            Outcome::Win
        } else if away_score > home_score {
            Outcome::Lose
        } else {
            Outcome::Draw
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "win" => Ok(Outcome::Win),
            "draw" => Ok(Outcome::Draw),
            "lose" => Ok(Outcome::Lose),
            other => Err(format!("invalid outcome '{}'", other)),
        }
    }
}

/// Fixture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureStatus {
    Pending,
    Live,
    Finished,
    Cancelled,
}

impl FixtureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureStatus::Pending => "pending",
            FixtureStatus::Live => "live",
            FixtureStatus::Finished => "finished",
            FixtureStatus::Cancelled => "cancelled",
        }
    }

    /// Wagers may only be placed while the fixture is pending or live
    pub fn accepts_wagers(&self) -> bool {
        matches!(self, FixtureStatus::Pending | FixtureStatus::Live)
    }
}

impl std::fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FixtureStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(FixtureStatus::Pending),
            "live" => Ok(FixtureStatus::Live),
            "finished" => Ok(FixtureStatus::Finished),
            "cancelled" => Ok(FixtureStatus::Cancelled),
            other => Err(format!("invalid fixture status '{}'", other)),
        }
    }
}

/// Stake total and wager count on one outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolSide {
    pub total: Decimal,
    pub bet_count: u32,
}

/// The three outcome pools of a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pools {
    pub win: PoolSide,
    pub draw: PoolSide,
    pub lose: PoolSide,
}

impl Pools {
    pub fn side(&self, outcome: Outcome) -> &PoolSide {
        match outcome {
            Outcome::Win => &self.win,
            Outcome::Draw => &self.draw,
            Outcome::Lose => &self.lose,
        }
    }

    pub fn side_mut(&mut self, outcome: Outcome) -> &mut PoolSide {
        match outcome {
            Outcome::Win => &mut self.win,
            Outcome::Draw => &mut self.draw,
            Outcome::Lose => &mut self.lose,
        }
    }

    /// Add one stake to an outcome pool
    pub fn add_stake(&mut self, outcome: Outcome, amount: Decimal) {
        let side = self.side_mut(outcome);
        side.total += amount;
        side.bet_count += 1;
    }

    pub fn total(&self) -> Decimal {
        self.win.total + self.draw.total + self.lose.total
    }

    pub fn bet_count(&self) -> u32 {
        self.win.bet_count + self.draw.bet_count + self.lose.bet_count
    }
}

/// Off-ledger fixture with its mirrored pools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub gameweek: u32,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_team_name: String,
    pub away_team_name: String,
    pub kickoff_time: Option<DateTime<Utc>>,
    pub status: FixtureStatus,
    pub home_score: Option<u8>,
    pub away_score: Option<u8>,
    pub pools: Pools,
    pub winning_outcome: Option<Outcome>,
    pub is_payout_processed: bool,
}

impl Fixture {
    /// Build a fresh fixture from feed data; pools start empty
    pub fn from_upsert(upsert: &FixtureUpsert) -> Self {
        Self {
            id: upsert.id,
            gameweek: upsert.gameweek,
            home_team_id: upsert.home_team_id,
            away_team_id: upsert.away_team_id,
            home_team_name: upsert.home_team_name.clone(),
            away_team_name: upsert.away_team_name.clone(),
            kickoff_time: upsert.kickoff_time,
            status: upsert.status,
            home_score: None,
            away_score: None,
            pools: Pools::default(),
            winning_outcome: None,
            is_payout_processed: false,
        }
    }

    /// Refresh schedule and team data without touching pools or results.
    ///
    /// A finished fixture keeps its status; the feed cannot reopen it.
    pub fn refresh(&mut self, upsert: &FixtureUpsert) {
        self.gameweek = upsert.gameweek;
        self.home_team_id = upsert.home_team_id;
        self.away_team_id = upsert.away_team_id;
        self.home_team_name = upsert.home_team_name.clone();
        self.away_team_name = upsert.away_team_name.clone();
        self.kickoff_time = upsert.kickoff_time;
        if self.status != FixtureStatus::Finished {
            self.status = upsert.status;
        }
    }

    pub fn final_score(&self) -> Option<(u8, u8)> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }
}

/// Schedule/team data for creating or refreshing a fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureUpsert {
    pub id: FixtureId,
    pub gameweek: u32,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_team_name: String,
    pub away_team_name: String,
    pub kickoff_time: Option<DateTime<Utc>>,
    pub status: FixtureStatus,
}
