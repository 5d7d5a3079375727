pub mod api_server;
pub mod chain;
pub mod fixture_feed;
pub mod oracle_contract;
pub mod payout_contract;
pub mod postgres;

pub use chain::LedgerConnection;
pub use fixture_feed::{Bootstrap, FixtureRecord, HttpFixtureFeed, MatchConclusion};
pub use oracle_contract::ContractOracle;
pub use payout_contract::ContractPayoutLedger;
pub use postgres::PostgresPoolStore;
