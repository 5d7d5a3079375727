use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::settlement::Schedule;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub ledger: LedgerConfig,
    pub settlement: SettlementConfig,
    pub api: ApiConfig,
    /// Off-ledger pool ledger; the mirror is disabled when absent
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the sports-data provider (serves /fixtures and /bootstrap)
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
    /// Minutes after kickoff after which a match is presumed concluded
    #[serde(default = "default_grace_period")]
    pub grace_period_mins: i64,
}

fn default_feed_timeout() -> u64 {
    10
}

fn default_grace_period() -> i64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the chain hosting both contracts
    pub rpc_url: String,
    /// Outcome oracle contract address
    pub oracle_address: String,
    /// Payout ledger contract address
    pub payout_address: String,
    /// Timeout for read calls in seconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
    /// How long to wait for a write to confirm
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Block confirmations required before a write counts as done
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Maximum unsettled wagers collected per pass
    #[serde(default = "default_scan_cap")]
    pub scan_cap: usize,
    /// Concurrent getWager reads during discovery
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
    /// Minimum native balance of the authority before writes are attempted
    #[serde(default = "default_min_native_gas_wei")]
    pub min_native_gas_wei: u64,
}

fn default_rpc_timeout() -> u64 {
    15
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_confirmations() -> u64 {
    1
}

fn default_scan_cap() -> usize {
    100
}

fn default_scan_concurrency() -> usize {
    8
}

fn default_min_native_gas_wei() -> u64 {
    5_000_000_000_000_000 // 0.005 native token buffer
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    /// Schedule expression, e.g. "*/5 * * * *" or "@every 5m"
    pub schedule: String,
    /// Run one pass immediately when the service starts
    #[serde(default)]
    pub run_on_startup: bool,
}

impl SettlementConfig {
    pub fn parsed_schedule(&self) -> Result<Schedule, String> {
        Schedule::parse(&self.schedule)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Required on POST /settlement/run when set
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_api_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub(crate) fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            )
        })
        .unwrap_or(default)
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let run_on_startup = std::env::var("SETTLEMENT_RUN_ON_STARTUP")
            .ok()
            .map(|_| env_flag("SETTLEMENT_RUN_ON_STARTUP", false));

        let builder = Config::builder()
            // Start with default values
            .set_default("feed.base_url", "https://fantasy.premierleague.com/api")?
            .set_default("feed.timeout_secs", 10)?
            .set_default("feed.grace_period_mins", 120)?
            .set_default("ledger.rpc_url", "http://127.0.0.1:8545")?
            .set_default("ledger.oracle_address", "")?
            .set_default("ledger.payout_address", "")?
            .set_default("settlement.schedule", "*/5 * * * *")?
            .set_default("settlement.run_on_startup", false)?
            .set_default("api.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PITCHPOOL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PITCHPOOL_LEDGER__RPC_URL, etc.)
            .add_source(
                Environment::with_prefix("PITCHPOOL")
                    .separator("__")
                    .try_parsing(true),
            )
            // Plain deployment variables win over everything else
            .set_override_option("feed.base_url", env_nonempty("FIXTURE_FEED_URL"))?
            .set_override_option("ledger.rpc_url", env_nonempty("LEDGER_RPC_URL"))?
            .set_override_option("ledger.oracle_address", env_nonempty("ORACLE_CONTRACT_ADDRESS"))?
            .set_override_option("ledger.payout_address", env_nonempty("PAYOUT_CONTRACT_ADDRESS"))?
            .set_override_option("settlement.schedule", env_nonempty("SETTLEMENT_SCHEDULE"))?
            .set_override_option("settlement.run_on_startup", run_on_startup)?
            .set_override_option("database.url", env_nonempty("DATABASE_URL"))?;

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if url::Url::parse(&self.feed.base_url).is_err() {
            errors.push(format!("feed.base_url is not a valid URL: {}", self.feed.base_url));
        }
        if self.feed.timeout_secs == 0 {
            errors.push("feed.timeout_secs must be positive".to_string());
        }
        if self.feed.grace_period_mins <= 0 {
            errors.push("feed.grace_period_mins must be positive".to_string());
        }

        if url::Url::parse(&self.ledger.rpc_url).is_err() {
            errors.push(format!("ledger.rpc_url is not a valid URL: {}", self.ledger.rpc_url));
        }
        for (name, value) in [
            ("ledger.oracle_address", &self.ledger.oracle_address),
            ("ledger.payout_address", &self.ledger.payout_address),
        ] {
            if value.parse::<alloy::primitives::Address>().is_err() {
                errors.push(format!("{} is not a valid address: '{}'", name, value));
            }
        }
        if self.ledger.scan_cap == 0 {
            errors.push("ledger.scan_cap must be positive".to_string());
        }
        if self.ledger.scan_concurrency == 0 {
            errors.push("ledger.scan_concurrency must be positive".to_string());
        }

        if let Err(e) = self.settlement.parsed_schedule() {
            errors.push(format!("settlement.schedule: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            feed: FeedConfig {
                base_url: "https://feed.example.com/api".to_string(),
                timeout_secs: 10,
                grace_period_mins: 120,
            },
            ledger: LedgerConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                oracle_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
                payout_address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".to_string(),
                rpc_timeout_secs: 15,
                confirmation_timeout_secs: 120,
                confirmations: 1,
                scan_cap: 100,
                scan_concurrency: 8,
                min_native_gas_wei: default_min_native_gas_wei(),
            },
            settlement: SettlementConfig {
                schedule: "*/5 * * * *".to_string(),
                run_on_startup: false,
            },
            api: ApiConfig {
                port: 8080,
                admin_token: None,
            },
            database: None,
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_sample_config_is_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = sample();
        config.ledger.oracle_address = String::new();
        config.ledger.scan_cap = 0;
        config.settlement.schedule = "every tuesday".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("oracle_address")));
        assert!(errors.iter().any(|e| e.contains("scan_cap")));
        assert!(errors.iter().any(|e| e.contains("settlement.schedule")));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/pitchpool-config").unwrap();
        assert_eq!(config.feed.timeout_secs, 10);
        assert_eq!(config.feed.grace_period_mins, 120);
        assert_eq!(config.ledger.scan_cap, 100);
        assert_eq!(config.api.port, 8080);
    }
}
