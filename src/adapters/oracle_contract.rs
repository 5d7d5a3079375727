//! Outcome oracle bridge.
//!
//! The oracle stores one result per (gameweek, matchId) and rejects a second
//! write. Submissions re-check for an existing record first and fold a
//! duplicate-write revert into [`OutcomeSubmission::AlreadyExists`].

use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use alloy::sol;
use alloy::sol_types::{Revert, SolError, SolInterface};
use async_trait::async_trait;
use chrono::DateTime;
use tracing::{debug, info, instrument, warn};

use super::chain::{parse_address, LedgerConnection};
use crate::domain::{FixtureKey, OutcomeRecord, TxReceipt};
use crate::error::{OracleError, Result};
use crate::settlement::{OutcomeOracle, OutcomeSubmission};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IOutcomeOracle {
        error OutcomeAlreadyExists();
        error Unauthorized();

        function hasOutcome(uint256 gameweek, uint256 matchId) external view returns (bool);

        function getOutcome(uint256 gameweek, uint256 matchId)
            external
            view
            returns (uint8 homeScore, uint8 awayScore, string memory status, uint256 timestamp, bool exists);

        function submitOutcome(
            uint256 gameweek,
            uint256 matchId,
            uint8 homeScore,
            uint8 awayScore,
            string calldata status
        ) external;
    }
}

/// Why an oracle write was refused
#[derive(Debug, Clone, PartialEq, Eq)]
enum OracleRevert {
    AlreadyExists,
    Unauthorized,
    Reason(String),
}

fn decode_oracle_revert(data: &[u8]) -> OracleRevert {
    if let Ok(decoded) = IOutcomeOracle::IOutcomeOracleErrors::abi_decode(data) {
        return match decoded {
            IOutcomeOracle::IOutcomeOracleErrors::OutcomeAlreadyExists(_) => OracleRevert::AlreadyExists,
            IOutcomeOracle::IOutcomeOracleErrors::Unauthorized(_) => OracleRevert::Unauthorized,
        };
    }
    match Revert::abi_decode(data) {
        Ok(revert) => oracle_revert_from_message(&revert.reason),
        Err(_) => OracleRevert::Reason(format!("undecodable revert data ({} bytes)", data.len())),
    }
}

fn oracle_revert_from_message(message: &str) -> OracleRevert {
    let normalized = message.to_ascii_lowercase();
    if normalized.contains("already exists") || normalized.contains("already submitted") {
        OracleRevert::AlreadyExists
    } else if normalized.contains("unauthorized") || normalized.contains("not authorized") {
        OracleRevert::Unauthorized
    } else {
        OracleRevert::Reason(message.to_string())
    }
}

/// alloy-backed [`OutcomeOracle`]
pub struct ContractOracle {
    connection: LedgerConnection,
    contract: IOutcomeOracle::IOutcomeOracleInstance<DynProvider>,
}

impl ContractOracle {
    pub fn new(connection: LedgerConnection, address: &str) -> Result<Self> {
        let address: Address = parse_address("oracle", address)?;
        let contract = IOutcomeOracle::new(address, connection.provider().clone());
        Ok(Self { connection, contract })
    }

    fn timeout_error(&self) -> OracleError {
        OracleError::Timeout {
            secs: self.connection.rpc_timeout().as_secs(),
        }
    }

    fn map_call_error(&self, err: alloy::contract::Error) -> OracleError {
        match err.as_revert_data() {
            Some(data) => match decode_oracle_revert(&data) {
                OracleRevert::Unauthorized => OracleError::Unauthorized,
                OracleRevert::AlreadyExists => OracleError::Rejected("outcome already exists".to_string()),
                OracleRevert::Reason(reason) => OracleError::Rejected(reason),
            },
            None => OracleError::Rpc(err.to_string()),
        }
    }
}

#[async_trait]
impl OutcomeOracle for ContractOracle {
    fn can_submit(&self) -> bool {
        self.connection.authority().is_some()
    }

    #[instrument(skip(self), fields(fixture = %key))]
    async fn has_outcome(&self, key: FixtureKey) -> std::result::Result<bool, OracleError> {
        let call = self
            .contract
            .hasOutcome(U256::from(key.gameweek), U256::from(key.match_id));
        match self.connection.read(call.call()).await {
            Some(Ok(exists)) => Ok(exists),
            Some(Err(e)) => Err(self.map_call_error(e)),
            None => Err(self.timeout_error()),
        }
    }

    #[instrument(skip(self), fields(fixture = %key))]
    async fn get_outcome(&self, key: FixtureKey) -> std::result::Result<OutcomeRecord, OracleError> {
        let call = self
            .contract
            .getOutcome(U256::from(key.gameweek), U256::from(key.match_id));
        let raw = match self.connection.read(call.call()).await {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return Err(self.map_call_error(e)),
            None => return Err(self.timeout_error()),
        };

        if !raw.exists {
            return Err(OracleError::NotFound(key));
        }

        let recorded_at = i64::try_from(raw.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(OutcomeRecord {
            key,
            home_score: raw.homeScore,
            away_score: raw.awayScore,
            status: raw.status,
            recorded_at,
            exists: raw.exists,
        })
    }

    #[instrument(skip(self), fields(fixture = %key))]
    async fn submit_outcome(
        &self,
        key: FixtureKey,
        home_score: u8,
        away_score: u8,
        status: &str,
    ) -> std::result::Result<OutcomeSubmission, OracleError> {
        let authority = self
            .connection
            .authority()
            .ok_or(OracleError::AuthorityMissing)?;

        // Re-check under the lock so an overlapping pass that just wrote is seen
        let _write = authority.write_lock().await;

        if self.has_outcome(key).await? {
            let existing = self.get_outcome(key).await?;
            debug!("Outcome for {} already recorded, skipping write", key);
            return Ok(OutcomeSubmission::AlreadyExists(existing));
        }

        info!(
            "Submitting outcome {} {}-{} ({}) to oracle",
            key, home_score, away_score, status
        );

        let tx = self.contract.submitOutcome(
            U256::from(key.gameweek),
            U256::from(key.match_id),
            home_score,
            away_score,
            status.to_string(),
        );

        let pending = match tx.send().await {
            Ok(pending) => pending,
            Err(e) => {
                let revert = e.as_revert_data().map(|data| decode_oracle_revert(&data));
                return match revert {
                    Some(OracleRevert::AlreadyExists) => {
                        warn!("Oracle reported {} already recorded; another run got there first", key);
                        let existing = self.get_outcome(key).await?;
                        Ok(OutcomeSubmission::AlreadyExists(existing))
                    }
                    Some(OracleRevert::Unauthorized) => Err(OracleError::Unauthorized),
                    Some(OracleRevert::Reason(reason)) => Err(OracleError::Rejected(reason)),
                    None => Err(OracleError::Rpc(e.to_string())),
                };
            }
        };

        let confirm = pending
            .with_required_confirmations(self.connection.confirmations())
            .get_receipt();
        let receipt = match tokio::time::timeout(self.connection.confirmation_timeout(), confirm).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => return Err(OracleError::Rpc(format!("confirmation failed: {}", e))),
            Err(_) => {
                return Err(OracleError::Timeout {
                    secs: self.connection.confirmation_timeout().as_secs(),
                })
            }
        };

        if !receipt.status() {
            return Err(OracleError::Rejected(format!(
                "submitOutcome transaction {:?} reverted",
                receipt.transaction_hash
            )));
        }

        let tx_hash = format!("{:?}", receipt.transaction_hash);
        info!("Outcome for {} recorded. Tx: {}", key, tx_hash);

        Ok(OutcomeSubmission::Submitted(TxReceipt {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        }))
    }
}
