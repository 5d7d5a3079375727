pub mod adapters;
pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod settlement;
pub mod signing;

pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use error::{PitchError, Result};
pub use ledger::{PoolLedger, PoolStore};
pub use settlement::{BatchSummary, Scheduler, SettlementOrchestrator};
