//! TipJar contract ABI: `sendTip` calldata, `Tipped` log decoding.
//!
//! ```text
//! function sendTip(address payable to, string calldata message) external payable
//! event Tipped(address indexed from, address indexed to, uint256 amount, string message, uint256 timestamp)
//! ```

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::types::{TipEvent, TxRequest};

sol! {
    event Tipped(address indexed from, address indexed to, uint256 amount, string message, uint256 timestamp);
    function sendTip(address to, string message) external payable;
}

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<U64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<U64>,
    #[serde(default)]
    pub removed: bool,
}

/// The tip target: a TipJar contract, or plain native transfers when unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TipJar {
    pub address: Option<Address>,
}

impl TipJar {
    pub fn new(address: Option<Address>) -> Self { Self { address } }

    pub fn is_native(&self) -> bool { self.address.is_none() }

    /// Topic 0 of `Tipped`.
    pub fn topic() -> B256 { Tipped::SIGNATURE_HASH }

    /// Transaction that tips `to`. In contract mode the value goes to the
    /// contract with `sendTip` calldata; otherwise it is a plain transfer.
    pub fn tip_transaction(&self, from: Address, to: Address, value: U256, message: &str) -> TxRequest {
        match self.address {
            Some(contract) => TxRequest { from, to: contract, value, data: encode_send_tip(to, message) },
            None => TxRequest { from, to, value, data: Bytes::new() },
        }
    }

    /// `eth_getLogs` filter object for `Tipped` events.
    pub fn log_filter(&self, from_block: u64, to_block: Option<u64>) -> Option<Value> {
        let contract = self.address?;
        let to_block = to_block.map(|b| format!("{:#x}", b)).unwrap_or_else(|| "latest".into());
        Some(json!({
            "address": contract,
            "topics": [Self::topic()],
            "fromBlock": format!("{:#x}", from_block),
            "toBlock": to_block,
        }))
    }
}

/// ABI-encoded `sendTip(to, message)` call.
pub fn encode_send_tip(to: Address, message: &str) -> Bytes {
    sendTipCall { to, message: message.to_string() }.abi_encode().into()
}

/// Decode a `Tipped` log. Removed (reorged) logs and logs without a
/// transaction hash are rejected.
pub fn decode_tip_log(log: &LogEntry) -> Result<TipEvent, ProviderError> {
    if log.removed {
        return Err(ProviderError::Decode("log removed by reorg".into()));
    }
    if log.topics.first() != Some(&TipJar::topic()) {
        return Err(ProviderError::Decode("not a Tipped log".into()));
    }
    let tx_hash = log.transaction_hash.ok_or_else(|| ProviderError::Decode("pending log".into()))?;
    let decoded = Tipped::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| ProviderError::Decode(e.to_string()))?;
    let timestamp = u64::try_from(decoded.timestamp).map_err(|_| ProviderError::Decode("timestamp overflow".into()))?;
    Ok(TipEvent {
        tx_hash,
        log_index: log.log_index.map(|i| i.to::<u64>()).unwrap_or_default(),
        block_number: log.block_number.map(|b| b.to::<u64>()).unwrap_or_default(),
        from: decoded.from,
        to: decoded.to,
        amount: decoded.amount,
        message: decoded.message,
        timestamp,
    })
}
