//! Process coordination: signal handling and graceful shutdown.

pub mod shutdown;

pub use shutdown::{install_signal_handlers, GracefulShutdown, ShutdownPhase, ShutdownSignal, ShutdownToken};
