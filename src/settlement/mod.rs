//! Settlement: payout math, fixture grouping, the batch orchestrator and
//! its scheduler.

pub mod discovery;
pub mod orchestrator;
pub mod payout;
pub mod schedule;
pub mod scheduler;
pub mod traits;

pub use discovery::{group_by_fixture, WagerGroup};
pub use orchestrator::{
    BatchSummary, Disposition, GroupState, MirrorReport, MirrorStatus, SettlementJob,
    SettlementOrchestrator,
};
pub use payout::{compute_from_scores, compute_payout, PayoutInfo, PAYOUT_RATE};
pub use schedule::Schedule;
pub use scheduler::Scheduler;
pub use traits::{FixtureFeed, OutcomeOracle, OutcomeSubmission, PayoutLedger, SettlementReceipt};
