//! Payout ledger bridge.
//!
//! Wagers live in the contract under sequential ids. The low-water cursor only
//! moves past ids that are settled or empty, so nothing unsettled is ever
//! skipped. A pass starts where the previous one stopped and wraps around to
//! the low-water mark at `nextWagerId`, so a capped pass full of wagers on
//! unfinished fixtures cannot hide the ids above it.

use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use alloy::sol;
use alloy::sol_types::{Revert, SolError, SolInterface};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

use super::chain::{parse_address, u256_to_u32, LedgerConnection};
use crate::config::LedgerConfig;
use crate::domain::{FixtureKey, OnLedgerWager, Prediction, TxReceipt};
use crate::error::{Result, SettleError};
use crate::settlement::{PayoutLedger, SettlementReceipt};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IPayoutLedger {
        error OutcomeNotAvailable();
        error AlreadySettled();
        error Unauthorized();

        event FixtureSettled(
            uint256 indexed gameweek,
            uint256 indexed matchId,
            uint8 outcome,
            uint256 totalPayout
        );

        function nextWagerId() external view returns (uint256);

        function getWager(uint256 wagerId)
            external
            view
            returns (
                address bettor,
                uint256 gameweek,
                uint256 matchId,
                uint256 amount,
                uint8 prediction,
                bool isSettled,
                bool isWinner,
                uint256 timestamp
            );

        function isFixtureSettled(uint256 gameweek, uint256 matchId) external view returns (bool);

        function settle(uint256 gameweek, uint256 matchId) external;
    }
}

/// Typed reason for a reverted settlement call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleRevert {
    OutcomeNotAvailable,
    AlreadySettled,
    Unauthorized,
    Reason(String),
}

impl SettleRevert {
    fn into_error(self, key: FixtureKey) -> SettleError {
        match self {
            SettleRevert::OutcomeNotAvailable => SettleError::OutcomeNotAvailable(key),
            SettleRevert::AlreadySettled => SettleError::AlreadySettled(key),
            SettleRevert::Unauthorized => SettleError::Unauthorized,
            SettleRevert::Reason(reason) => SettleError::Rejected(reason),
        }
    }
}

/// Decode revert data from either a custom error or `Error(string)`
pub fn decode_revert_data(data: &[u8]) -> SettleRevert {
    if let Ok(decoded) = IPayoutLedger::IPayoutLedgerErrors::abi_decode(data) {
        return match decoded {
            IPayoutLedger::IPayoutLedgerErrors::OutcomeNotAvailable(_) => SettleRevert::OutcomeNotAvailable,
            IPayoutLedger::IPayoutLedgerErrors::AlreadySettled(_) => SettleRevert::AlreadySettled,
            IPayoutLedger::IPayoutLedgerErrors::Unauthorized(_) => SettleRevert::Unauthorized,
        };
    }
    match Revert::abi_decode(data) {
        Ok(revert) => revert_from_message(&revert.reason),
        Err(_) => SettleRevert::Reason(format!("undecodable revert data ({} bytes)", data.len())),
    }
}

/// Map a human-readable revert reason onto the typed variants
pub fn revert_from_message(message: &str) -> SettleRevert {
    let normalized = message.to_ascii_lowercase();
    if normalized.contains("outcome not available") || normalized.contains("outcome not set") {
        SettleRevert::OutcomeNotAvailable
    } else if normalized.contains("already settled") {
        SettleRevert::AlreadySettled
    } else if normalized.contains("unauthorized") || normalized.contains("not authorized") {
        SettleRevert::Unauthorized
    } else {
        SettleRevert::Reason(message.to_string())
    }
}

fn u256_to_decimal(value: U256) -> Option<Decimal> {
    Decimal::from_str(&value.to_string()).ok()
}

/// alloy-backed [`PayoutLedger`]
pub struct ContractPayoutLedger {
    connection: LedgerConnection,
    contract: IPayoutLedger::IPayoutLedgerInstance<DynProvider>,
    scan_cap: usize,
    scan_concurrency: usize,
    min_native_gas_wei: U256,
    /// Lowest id that may still be unsettled
    cursor: AtomicU64,
    /// Where the next pass starts reading
    resume: AtomicU64,
}

/// Result of reading one wager slot
enum Slot {
    Empty,
    Settled,
    Open(OnLedgerWager),
}

impl ContractPayoutLedger {
    pub fn new(connection: LedgerConnection, config: &LedgerConfig) -> Result<Self> {
        let address: Address = parse_address("payout ledger", &config.payout_address)?;
        let contract = IPayoutLedger::new(address, connection.provider().clone());
        Ok(Self {
            connection,
            contract,
            scan_cap: config.scan_cap.max(1),
            scan_concurrency: config.scan_concurrency.max(1),
            min_native_gas_wei: U256::from(config.min_native_gas_wei),
            cursor: AtomicU64::new(0),
            resume: AtomicU64::new(0),
        })
    }

    /// Current low-water mark of the wager scan
    pub fn scan_cursor(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    /// First id the next pass reads
    pub fn scan_resume(&self) -> u64 {
        self.resume.load(Ordering::Relaxed)
    }

    fn timeout_error(&self) -> SettleError {
        SettleError::Timeout {
            secs: self.connection.rpc_timeout().as_secs(),
        }
    }

    fn map_read_error(&self, err: alloy::contract::Error) -> SettleError {
        match err.as_revert_data() {
            Some(data) => match decode_revert_data(&data) {
                SettleRevert::Unauthorized => SettleError::Unauthorized,
                SettleRevert::Reason(reason) => SettleError::Rejected(reason),
                other => SettleError::Rejected(format!("{:?}", other)),
            },
            None => SettleError::Rpc(err.to_string()),
        }
    }

    fn map_write_error(&self, key: FixtureKey, err: alloy::contract::Error) -> SettleError {
        if let Some(data) = err.as_revert_data() {
            return decode_revert_data(&data).into_error(key);
        }
        // Some nodes only surface the reason in the error message
        match revert_from_message(&err.to_string()) {
            SettleRevert::Reason(_) => SettleError::Rpc(err.to_string()),
            typed => typed.into_error(key),
        }
    }

    async fn next_wager_id(&self) -> std::result::Result<u64, SettleError> {
        let call = self.contract.nextWagerId();
        match self.connection.read(call.call()).await {
            Some(Ok(next)) => Ok(u64::try_from(next).unwrap_or(u64::MAX)),
            Some(Err(e)) => Err(self.map_read_error(e)),
            None => Err(self.timeout_error()),
        }
    }

    async fn read_slot(&self, id: u64) -> std::result::Result<Slot, SettleError> {
        let call = self.contract.getWager(U256::from(id));
        let raw = match self.connection.read(call.call()).await {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => return Err(self.map_read_error(e)),
            None => return Err(self.timeout_error()),
        };

        if raw.bettor == Address::ZERO {
            return Ok(Slot::Empty);
        }
        if raw.isSettled {
            return Ok(Slot::Settled);
        }

        let (gameweek, match_id) = match (u256_to_u32(raw.gameweek), u256_to_u32(raw.matchId)) {
            (Some(gw), Some(id)) => (gw, id),
            _ => {
                warn!("Wager {} references an out-of-range fixture, ignoring", id);
                return Ok(Slot::Empty);
            }
        };
        let Some(prediction) = Prediction::from_code(raw.prediction) else {
            warn!("Wager {} has unknown prediction code {}, ignoring", id, raw.prediction);
            return Ok(Slot::Empty);
        };
        let amount = u256_to_decimal(raw.amount).unwrap_or(Decimal::ZERO);
        let placed_at = i64::try_from(raw.timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Ok(Slot::Open(OnLedgerWager {
            id,
            bettor: format!("{:?}", raw.bettor),
            key: FixtureKey::new(gameweek, match_id),
            prediction,
            amount,
            is_settled: raw.isSettled,
            is_winner: raw.isWinner,
            placed_at,
        }))
    }
}

#[async_trait]
impl PayoutLedger for ContractPayoutLedger {
    #[instrument(skip(self))]
    async fn preflight(&self) -> std::result::Result<(), SettleError> {
        let authority = self
            .connection
            .authority()
            .ok_or(SettleError::AuthorityMissing)?;

        let chain_id = self.connection.chain_id().await.map_err(SettleError::Rpc)?;

        let balance = self
            .connection
            .balance_of(authority.address())
            .await
            .map_err(SettleError::Rpc)?;

        if balance < self.min_native_gas_wei {
            warn!(
                "Authority {} gas balance {} wei below minimum {} wei",
                authority.address(),
                balance,
                self.min_native_gas_wei
            );
            return Err(SettleError::InsufficientGas {
                balance: balance.to_string(),
                required: self.min_native_gas_wei.to_string(),
            });
        }

        debug!(
            "Preflight ok: chain {} authority {} balance {} wei",
            chain_id,
            authority.address(),
            balance
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_unsettled_wagers(&self) -> std::result::Result<Vec<OnLedgerWager>, SettleError> {
        let next = self.next_wager_id().await?;
        let low = self.cursor.load(Ordering::Relaxed).min(next);
        let resume = self.resume.load(Ordering::Relaxed);
        let start = if resume > low && resume < next { resume } else { low };

        // [start, next) then wrap to [low, start)
        let mut reads = stream::iter((start..next).chain(low..start))
            .map(|id| async move { (id, self.read_slot(id).await) })
            .buffered(self.scan_concurrency);

        let mut wagers = Vec::new();
        let mut low_water = low;
        let mut prefix_closed = false;
        let mut stopped_at = None;

        while let Some((id, slot)) = reads.next().await {
            if id == low {
                prefix_closed = true;
            }
            match slot? {
                Slot::Empty | Slot::Settled => {
                    if prefix_closed {
                        low_water = id + 1;
                    }
                }
                Slot::Open(wager) => {
                    prefix_closed = false;
                    wagers.push(wager);
                    if wagers.len() >= self.scan_cap {
                        stopped_at = Some(id);
                        break;
                    }
                }
            }
        }

        if low_water > low {
            self.cursor.fetch_max(low_water, Ordering::Relaxed);
        }
        let resume_at = match stopped_at {
            Some(id) => id + 1,
            None => low_water,
        };
        self.resume.store(resume_at, Ordering::Relaxed);

        info!(
            "Scanned wagers from {} (head {}): {} unsettled (cap {}), cursor now {}, next pass from {}",
            start,
            next,
            wagers.len(),
            self.scan_cap,
            self.scan_cursor(),
            resume_at
        );
        Ok(wagers)
    }

    #[instrument(skip(self), fields(fixture = %key))]
    async fn is_fixture_settled(&self, key: FixtureKey) -> std::result::Result<bool, SettleError> {
        let call = self
            .contract
            .isFixtureSettled(U256::from(key.gameweek), U256::from(key.match_id));
        match self.connection.read(call.call()).await {
            Some(Ok(settled)) => Ok(settled),
            Some(Err(e)) => Err(self.map_read_error(e)),
            None => Err(self.timeout_error()),
        }
    }

    #[instrument(skip(self), fields(fixture = %key))]
    async fn settle(&self, key: FixtureKey) -> std::result::Result<SettlementReceipt, SettleError> {
        let authority = self
            .connection
            .authority()
            .ok_or(SettleError::AuthorityMissing)?;

        let _write = authority.write_lock().await;

        info!("Settling {} on payout ledger", key);

        let tx = self
            .contract
            .settle(U256::from(key.gameweek), U256::from(key.match_id));

        let pending = tx.send().await.map_err(|e| self.map_write_error(key, e))?;

        let confirm = pending
            .with_required_confirmations(self.connection.confirmations())
            .get_receipt();
        let receipt = match tokio::time::timeout(self.connection.confirmation_timeout(), confirm).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => return Err(SettleError::Rpc(format!("confirmation failed: {}", e))),
            Err(_) => {
                return Err(SettleError::Timeout {
                    secs: self.connection.confirmation_timeout().as_secs(),
                })
            }
        };

        if !receipt.status() {
            return Err(SettleError::Rejected(format!(
                "settle transaction {:?} reverted",
                receipt.transaction_hash
            )));
        }

        let event = receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| log.log_decode::<IPayoutLedger::FixtureSettled>().ok())
            .map(|log| log.inner.data);

        let outcome = event
            .as_ref()
            .and_then(|e| Prediction::from_code(e.outcome))
            .map(|p| p.outcome());
        let total_payout = event.as_ref().and_then(|e| u256_to_decimal(e.totalPayout));

        let tx_hash = format!("{:?}", receipt.transaction_hash);
        info!(
            "Settled {}. Tx: {} outcome={:?} total_payout={:?}",
            key, tx_hash, outcome, total_payout
        );

        Ok(SettlementReceipt {
            receipt: TxReceipt {
                tx_hash,
                block_number: receipt.block_number,
                gas_used: receipt.gas_used,
            },
            outcome,
            total_payout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;
    use alloy::providers::{Provider, ProviderBuilder};
    use alloy::sol_types::SolCall;
    use alloy::transports::mock::Asserter;

    fn mocked_ledger(asserter: &Asserter, scan_cap: usize) -> ContractPayoutLedger {
        let config = LedgerConfig {
            rpc_url: "http://localhost:8545".to_string(),
            oracle_address: Address::repeat_byte(0x01).to_string(),
            payout_address: Address::repeat_byte(0x02).to_string(),
            rpc_timeout_secs: 5,
            confirmation_timeout_secs: 5,
            confirmations: 1,
            scan_cap,
            // One read at a time keeps the mocked responses in id order
            scan_concurrency: 1,
            min_native_gas_wei: 0,
        };
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        let connection = LedgerConnection::with_provider(provider, None, &config);
        ContractPayoutLedger::new(connection, &config).unwrap()
    }

    fn push_head(asserter: &Asserter, next: u64) {
        let data = IPayoutLedger::nextWagerIdCall::abi_encode_returns(&U256::from(next));
        asserter.push_success(&Bytes::from(data));
    }

    fn push_slot(asserter: &Asserter, key: Option<FixtureKey>, settled: bool) {
        let ret = IPayoutLedger::getWagerReturn {
            bettor: if key.is_some() { Address::repeat_byte(0xaa) } else { Address::ZERO },
            gameweek: U256::from(key.map_or(0, |k| k.gameweek)),
            matchId: U256::from(key.map_or(0, |k| k.match_id)),
            amount: U256::from(10u64),
            prediction: 0,
            isSettled: settled,
            isWinner: false,
            timestamp: U256::from(1_700_000_000u64),
        };
        let data = IPayoutLedger::getWagerCall::abi_encode_returns(&ret);
        asserter.push_success(&Bytes::from(data));
    }

    fn ids(wagers: &[OnLedgerWager]) -> Vec<u64> {
        wagers.iter().map(|w| w.id).collect()
    }

    #[tokio::test]
    async fn test_capped_scan_reaches_wagers_beyond_the_cap() {
        let asserter = Asserter::new();
        let ledger = mocked_ledger(&asserter, 2);
        let later = Some(FixtureKey::new(9, 900));
        let finished = Some(FixtureKey::new(1, 100));

        // Ids 0 and 1 sit on a fixture that has not been played yet
        push_head(&asserter, 3);
        push_slot(&asserter, later, false);
        push_slot(&asserter, later, false);
        let first = ledger.list_unsettled_wagers().await.unwrap();
        assert_eq!(ids(&first), vec![0, 1]);
        assert_eq!(ledger.scan_resume(), 2);

        push_head(&asserter, 3);
        push_slot(&asserter, finished, false);
        push_slot(&asserter, later, false);
        let second = ledger.list_unsettled_wagers().await.unwrap();
        assert_eq!(ids(&second), vec![2, 0]);
        assert_eq!(second[0].key, FixtureKey::new(1, 100));

        push_head(&asserter, 3);
        push_slot(&asserter, later, false);
        push_slot(&asserter, finished, false);
        let third = ledger.list_unsettled_wagers().await.unwrap();
        assert_eq!(ids(&third), vec![1, 2]);

        assert_eq!(ledger.scan_cursor(), 0);
        assert!(asserter.read_q().is_empty());
    }

    #[tokio::test]
    async fn test_full_lap_advances_cursor_over_settled_prefix() {
        let asserter = Asserter::new();
        let ledger = mocked_ledger(&asserter, 10);
        let key = Some(FixtureKey::new(3, 30));

        push_head(&asserter, 4);
        push_slot(&asserter, key, true);
        push_slot(&asserter, None, false);
        push_slot(&asserter, key, false);
        push_slot(&asserter, key, true);
        let wagers = ledger.list_unsettled_wagers().await.unwrap();

        assert_eq!(ids(&wagers), vec![2]);
        assert_eq!(wagers[0].prediction, Prediction::Home);
        assert_eq!(ledger.scan_cursor(), 2);
        assert_eq!(ledger.scan_resume(), 2);

        // The next pass starts at the low-water mark
        push_head(&asserter, 4);
        push_slot(&asserter, key, true);
        push_slot(&asserter, key, true);
        assert!(ledger.list_unsettled_wagers().await.unwrap().is_empty());
        assert_eq!(ledger.scan_cursor(), 4);
        assert!(asserter.read_q().is_empty());
    }

    #[test]
    fn test_custom_errors_map_to_typed_variants() {
        let key = FixtureKey::new(3, 41);

        let data = IPayoutLedger::OutcomeNotAvailable {}.abi_encode();
        assert_eq!(
            decode_revert_data(&data).into_error(key),
            SettleError::OutcomeNotAvailable(key)
        );

        let data = IPayoutLedger::AlreadySettled {}.abi_encode();
        assert_eq!(
            decode_revert_data(&data).into_error(key),
            SettleError::AlreadySettled(key)
        );

        let data = IPayoutLedger::Unauthorized {}.abi_encode();
        assert_eq!(decode_revert_data(&data), SettleRevert::Unauthorized);
    }

    #[test]
    fn test_error_string_reverts_are_matched() {
        let data = Revert {
            reason: "Fixture already settled".to_string(),
        }
        .abi_encode();
        assert_eq!(decode_revert_data(&data), SettleRevert::AlreadySettled);

        let data = Revert {
            reason: "Outcome not available".to_string(),
        }
        .abi_encode();
        assert_eq!(decode_revert_data(&data), SettleRevert::OutcomeNotAvailable);

        let data = Revert {
            reason: "paused".to_string(),
        }
        .abi_encode();
        assert_eq!(
            decode_revert_data(&data).into_error(FixtureKey::new(1, 1)),
            SettleError::Rejected("paused".to_string())
        );
    }

    #[test]
    fn test_u256_amounts_convert_exactly() {
        let amount = U256::from(10u64).pow(U256::from(18u64)) * U256::from(25u64);
        assert_eq!(
            u256_to_decimal(amount),
            Some(Decimal::from_str("25000000000000000000").unwrap())
        );
    }
}
