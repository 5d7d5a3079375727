use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;
use zeroize::Zeroize;

use crate::error::{PitchError, Result};

/// Environment variable holding the settlement authority's private key
pub const AUTHORITY_KEY_ENV: &str = "SETTLEMENT_PRIVATE_KEY";

/// Signing identity allowed to submit outcomes and trigger settlement.
///
/// # Security
/// The hex key is zeroized as soon as the signer is built; only the signer
/// itself is kept.
///
/// All writes from one authority share one nonce sequence, so callers take
/// [`SettlementAuthority::write_lock`] around every transaction.
#[derive(Clone)]
pub struct SettlementAuthority {
    signer: PrivateKeySigner,
    write_lock: Arc<Mutex<()>>,
}

impl SettlementAuthority {
    /// Create an authority from a private key hex string
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let mut secure_key = private_key.trim().trim_start_matches("0x").to_string();

        let parsed = secure_key.parse::<PrivateKeySigner>();
        secure_key.zeroize();

        let signer = parsed.map_err(|e| PitchError::Wallet(format!("Invalid private key: {}", e)))?;

        info!(
            "Settlement authority initialized: {} (private key zeroized from memory)",
            signer.address()
        );

        Ok(Self {
            signer,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Load the authority from the environment.
    ///
    /// Returns `Ok(None)` when the variable is unset, which leaves the
    /// service in read-only mode.
    pub fn from_env() -> Result<Option<Self>> {
        let mut private_key = match std::env::var(AUTHORITY_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => return Ok(None),
        };

        let result = Self::from_private_key(&private_key);
        private_key.zeroize();

        result.map(Some)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Wallet for a signing provider
    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }

    /// Serialize writes from this signer
    pub async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }
}

impl std::fmt::Debug for SettlementAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementAuthority")
            .field("address", &self.address())
            .finish()
    }
}
