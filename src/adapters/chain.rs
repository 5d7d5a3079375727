//! Shared JSON-RPC connection for the oracle and payout contracts.

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use std::future::IntoFuture;
use std::time::Duration;
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::{PitchError, Result};
use crate::signing::SettlementAuthority;

/// One provider per process. With an authority it signs and fills nonces;
/// without one it is read-only.
#[derive(Clone)]
pub struct LedgerConnection {
    provider: DynProvider,
    authority: Option<SettlementAuthority>,
    rpc_timeout: Duration,
    confirmation_timeout: Duration,
    confirmations: u64,
}

impl LedgerConnection {
    pub fn connect(config: &LedgerConfig, authority: Option<SettlementAuthority>) -> Result<Self> {
        let rpc_url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e| PitchError::AddressParsing(format!("Invalid RPC URL: {}", e)))?;

        let provider = match &authority {
            Some(authority) => {
                info!(
                    "Ledger connection {} signing as {}",
                    config.rpc_url,
                    authority.address()
                );
                ProviderBuilder::new()
                    .wallet(authority.wallet())
                    .connect_http(rpc_url)
                    .erased()
            }
            None => {
                info!("Ledger connection {} is read-only (no settlement authority)", config.rpc_url);
                ProviderBuilder::new().connect_http(rpc_url).erased()
            }
        };

        Ok(Self::with_provider(provider, authority, config))
    }

    /// Wrap an already built provider with the configured timeouts
    pub fn with_provider(
        provider: DynProvider,
        authority: Option<SettlementAuthority>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            provider,
            authority,
            rpc_timeout: Duration::from_secs(config.rpc_timeout_secs),
            confirmation_timeout: Duration::from_secs(config.confirmation_timeout_secs),
            confirmations: config.confirmations.max(1),
        }
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    pub fn authority(&self) -> Option<&SettlementAuthority> {
        self.authority.as_ref()
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// Run a read call under the RPC timeout; `None` on timeout
    pub async fn read<T, F>(&self, call: F) -> Option<T>
    where
        F: IntoFuture<Output = T>,
    {
        tokio::time::timeout(self.rpc_timeout, call).await.ok()
    }

    pub async fn chain_id(&self) -> std::result::Result<u64, String> {
        match self.read(self.provider.get_chain_id()).await {
            Some(Ok(id)) => Ok(id),
            Some(Err(e)) => Err(e.to_string()),
            None => Err(format!("timed out after {}s", self.rpc_timeout.as_secs())),
        }
    }

    pub async fn balance_of(&self, address: Address) -> std::result::Result<U256, String> {
        match self.read(self.provider.get_balance(address)).await {
            Some(Ok(balance)) => Ok(balance),
            Some(Err(e)) => Err(e.to_string()),
            None => Err(format!("timed out after {}s", self.rpc_timeout.as_secs())),
        }
    }
}

pub fn parse_address(name: &str, raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| PitchError::AddressParsing(format!("Invalid {} address '{}': {}", name, raw, e)))
}

/// Contract-side u256 to the u32 ids used by the feed
pub(crate) fn u256_to_u32(value: U256) -> Option<u32> {
    u32::try_from(value).ok()
}
