use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pitchpool")]
#[command(version)]
#[command(about = "Settlement orchestrator and pari-mutuel payout engine for fixture prediction pools", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(long, global = true, default_value = "config", env = "PITCHPOOL_CONFIG_DIR")]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler and the operator API until SIGINT/SIGTERM
    Serve {
        /// Override api.port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one settlement pass and print its summary as JSON
    Run,
    /// Print authority, schedule and connection status
    Status,
    /// Sync fixtures from the feed into the pool ledger
    SyncFixtures,
    /// Apply pool ledger database migrations
    Migrate,
}
