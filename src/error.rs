use thiserror::Error;

use crate::domain::{FixtureId, FixtureKey};

/// Main error type for the settlement engine
#[derive(Error, Debug)]
pub enum PitchError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Collaborator errors
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Settle(#[from] SettleError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Crypto/signing errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Address parsing error: {0}")]
    AddressParsing(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for PitchError
pub type Result<T> = std::result::Result<T, PitchError>;

/// Fixture feed failures. Always transient from the caller's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Fixture feed unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Unavailable(format!("request timed out: {}", err))
        } else {
            FeedError::Unavailable(err.to_string())
        }
    }
}

/// Outcome oracle failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("No outcome recorded for {0}")]
    NotFound(FixtureKey),

    #[error("Settlement authority key not configured; oracle writes disabled")]
    AuthorityMissing,

    #[error("Oracle rejected submission: settlement authority not authorized")]
    Unauthorized,

    #[error("Oracle RPC error: {0}")]
    Rpc(String),

    #[error("Oracle call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Oracle rejected submission: {0}")]
    Rejected(String),
}

impl OracleError {
    /// Whether the next scheduled pass may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Rpc(_) | OracleError::Timeout { .. })
    }
}

/// Payout ledger failures, mapped from contract reverts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    #[error("Outcome not yet available on the oracle for {0}")]
    OutcomeNotAvailable(FixtureKey),

    #[error("Fixture {0} already settled")]
    AlreadySettled(FixtureKey),

    #[error("Settlement authority key not configured; settlement writes disabled")]
    AuthorityMissing,

    #[error("Payout ledger rejected call: settlement authority not authorized")]
    Unauthorized,

    #[error("Settlement authority gas balance too low: {balance} wei < {required} wei")]
    InsufficientGas { balance: String, required: String },

    #[error("Payout ledger RPC error: {0}")]
    Rpc(String),

    #[error("Payout ledger call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Payout ledger rejected call: {0}")]
    Rejected(String),
}

impl SettleError {
    /// Whether the next scheduled pass may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SettleError::OutcomeNotAvailable(_) | SettleError::Rpc(_) | SettleError::Timeout { .. }
        )
    }
}

/// Off-ledger pool ledger failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Fixture not found: {0}")]
    FixtureNotFound(FixtureId),

    #[error("Fixture {0} is closed for wagering")]
    FixtureClosed(FixtureId),

    #[error("User {user_id} already holds a wager on fixture {fixture_id}")]
    DuplicateWager { user_id: String, fixture_id: FixtureId },

    #[error("Wager amount must be positive")]
    InvalidAmount,

    #[error("Payout already processed for fixture {0}")]
    AlreadyProcessed(FixtureId),

    #[error("No final result recorded for fixture {0}")]
    ResultPending(FixtureId),

    #[error("No eligible payout for fixture {0}: winning pool is empty")]
    NoEligiblePayout(FixtureId),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}
