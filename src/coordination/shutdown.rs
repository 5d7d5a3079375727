//! Graceful Shutdown Handler
//!
//! One [`GracefulShutdown`] per process hands out [`ShutdownToken`]s to the
//! scheduler and the API server. Tokens observe the request even if they
//! were created after it, so a late subscriber never misses a shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Urgent shutdown - skip waiting for the in-flight pass
    Urgent,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
        }
    }
}

/// Shutdown phase tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// Waiting for the in-flight settlement pass
    DrainingSettlement,
    /// Draining HTTP connections
    StoppingApi,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::DrainingSettlement => write!(f, "draining_settlement"),
            ShutdownPhase::StoppingApi => write!(f, "stopping_api"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Graceful shutdown coordinator
pub struct GracefulShutdown {
    shutdown_requested: AtomicBool,
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
    phase_tx: watch::Sender<ShutdownPhase>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        let (signal_tx, _) = watch::channel(None);
        let (phase_tx, _) = watch::channel(ShutdownPhase::Running);
        Self {
            shutdown_requested: AtomicBool::new(false),
            signal_tx,
            phase_tx,
            drain_timeout,
        }
    }

    /// Create with default configuration (120s drain)
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(120))
    }

    /// Upper bound on waiting for in-flight work
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Request shutdown with specified signal type
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.signal_tx.send_replace(Some(signal));
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase_tx.borrow()
    }

    pub fn set_phase(&self, phase: ShutdownPhase) {
        self.phase_tx.send_replace(phase);
        info!("Shutdown phase: {}", phase);
    }

    /// Create a token that can be used to check shutdown status
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            signal_rx: self.signal_tx.subscribe(),
        }
    }
}

/// Token for checking shutdown status in async tasks
#[derive(Clone)]
pub struct ShutdownToken {
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_rx.borrow().is_some()
    }

    /// The requested signal, if any
    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.signal_rx.borrow()
    }

    /// Wait for shutdown signal
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.signal_rx.borrow_and_update() {
                return signal;
            }
            if self.signal_rx.changed().await.is_err() {
                // Coordinator dropped
                return ShutdownSignal::Urgent;
            }
        }
    }

    /// Resolves once an urgent shutdown is requested
    pub async fn wait_for_urgent(&mut self) {
        loop {
            if matches!(*self.signal_rx.borrow_and_update(), Some(ShutdownSignal::Urgent)) {
                return;
            }
            if self.signal_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Helper to install OS signal handlers
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let shutdown_sigterm = shutdown.clone();
        let shutdown_sigint = shutdown.clone();

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("Received SIGTERM");
                    shutdown_sigterm.request_shutdown(ShutdownSignal::Graceful);
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        });

        tokio::spawn(async move {
            match signal(SignalKind::interrupt()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("Received SIGINT");
                    shutdown_sigint.request_shutdown(ShutdownSignal::Graceful);
                    // A second Ctrl+C stops waiting for the in-flight pass
                    stream.recv().await;
                    warn!("Received second SIGINT - urgent shutdown");
                    shutdown_sigint.signal_tx.send_replace(Some(ShutdownSignal::Urgent));
                }
                Err(e) => error!("Failed to install SIGINT handler: {}", e),
            }
        });
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    shutdown.request_shutdown(ShutdownSignal::Graceful);
                }
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        });
    }
}
