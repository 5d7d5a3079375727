use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::orchestrator::{BatchSummary, SettlementOrchestrator};
use super::schedule::Schedule;
use crate::coordination::{ShutdownSignal, ShutdownToken};

/// Resets the single-flight flag when a pass ends, even on panic
struct FlightGuard(Arc<AtomicBool>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Releases one manual-run slot when the pass task ends
struct ManualRunGuard(Arc<AtomicUsize>);

impl ManualRunGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for ManualRunGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fires settlement passes on a schedule, never two scheduled passes at once
pub struct Scheduler {
    orchestrator: Arc<SettlementOrchestrator>,
    schedule: Schedule,
    run_on_startup: bool,
    in_flight: Arc<AtomicBool>,
    manual_runs: Arc<AtomicUsize>,
    last_run: Arc<RwLock<Option<BatchSummary>>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<SettlementOrchestrator>, schedule: Schedule, run_on_startup: bool) -> Self {
        Self {
            orchestrator,
            schedule,
            run_on_startup,
            in_flight: Arc::new(AtomicBool::new(false)),
            manual_runs: Arc::new(AtomicUsize::new(0)),
            last_run: Arc::new(RwLock::new(None)),
        }
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn run_on_startup(&self) -> bool {
        self.run_on_startup
    }

    pub fn orchestrator(&self) -> &SettlementOrchestrator {
        &self.orchestrator
    }

    /// A scheduled or manual pass is executing
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) || self.manual_runs.load(Ordering::SeqCst) > 0
    }

    pub async fn last_run(&self) -> Option<BatchSummary> {
        self.last_run.read().await.clone()
    }

    /// Run one scheduled pass unless one is already in flight.
    ///
    /// Returns `None` when the trigger was skipped.
    pub async fn trigger(&self) -> Option<BatchSummary> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Settlement pass still in flight, skipping this trigger");
            return None;
        }
        let _guard = FlightGuard(self.in_flight.clone());

        let summary = self.orchestrator.run_once().await;
        *self.last_run.write().await = Some(summary.clone());
        Some(summary)
    }

    /// Run one pass now, regardless of the single-flight guard.
    ///
    /// Writes stay serialized by the authority's write lock. The pass runs on
    /// its own task, so dropping the returned future leaves it to finish.
    pub async fn run_manual(&self) -> BatchSummary {
        info!("Manual settlement pass requested");
        let guard = ManualRunGuard::enter(&self.manual_runs);
        let orchestrator = self.orchestrator.clone();
        let last_run = self.last_run.clone();

        let pass = tokio::spawn(async move {
            let _guard = guard;
            let summary = orchestrator.run_once().await;
            *last_run.write().await = Some(summary.clone());
            summary
        });

        match pass.await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Manual settlement pass did not complete: {}", e);
                BatchSummary::aborted(format!("manual pass failed: {}", e))
            }
        }
    }

    fn spawn_pass(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if let Some(summary) = scheduler.trigger().await {
                if let Some(err) = &summary.error {
                    error!("Scheduled settlement pass aborted: {}", err);
                }
            }
        })
    }

    /// Tick until shutdown, then wait up to `drain_timeout` for the pass in flight
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownToken, drain_timeout: Duration) {
        info!(
            "Settlement scheduler started (schedule: {}, run_on_startup: {})",
            self.schedule, self.run_on_startup
        );

        let mut current: Option<JoinHandle<()>> = None;
        if self.run_on_startup {
            current = Some(self.spawn_pass());
        }

        let signal = loop {
            let delay = self.schedule.next_delay(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if self.in_flight.load(Ordering::SeqCst) {
                        warn!("Previous settlement pass still running, skipping tick");
                        continue;
                    }
                    current = Some(self.spawn_pass());
                }
                signal = shutdown.wait_for_shutdown() => break signal,
            }
        };

        let Some(mut handle) = current.filter(|h| !h.is_finished()) else {
            info!("Settlement scheduler stopped");
            return;
        };

        match signal {
            ShutdownSignal::Urgent => {
                warn!("Urgent shutdown: abandoning in-flight settlement pass");
                handle.abort();
            }
            ShutdownSignal::Graceful => {
                info!("Waiting up to {}s for in-flight settlement pass", drain_timeout.as_secs());
                tokio::select! {
                    res = tokio::time::timeout(drain_timeout, &mut handle) => {
                        if res.is_err() {
                            warn!("In-flight settlement pass did not finish before the drain timeout");
                            handle.abort();
                        }
                    }
                    _ = shutdown.wait_for_urgent() => {
                        warn!("Urgent shutdown while draining: abandoning settlement pass");
                        handle.abort();
                    }
                }
            }
        }
        info!("Settlement scheduler stopped");
    }
}
