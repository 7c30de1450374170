//! JSON-RPC adapters over an EVM node endpoint.
//!
//! - [`RpcClient`] - `ChainClient` over plain HTTP JSON-RPC
//! - [`NodeWallet`] - `WalletProvider` backed by node-managed accounts
//! - [`LogEventSource`] - `TipEventSource` polling `eth_getLogs`

mod logs;
mod wallet;

pub use logs::LogEventSource;
pub use wallet::NodeWallet;

use alloy_primitives::{Address, B256, U256, U64};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::TipJarConfig;
use crate::error::{ProviderError, TipError};
use crate::provider::ChainClient;
use crate::types::TxRequest;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: Option<U64>,
    block_number: Option<U64>,
}

/// HTTP JSON-RPC client. Cheap to clone.
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: Arc<AtomicU64>,
    confirmation_poll: Duration,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
            confirmation_poll: Duration::from_secs(2),
        })
    }

    /// Client for the first RPC URL of the configured network.
    pub fn from_config(config: &TipJarConfig) -> Result<Self, TipError> {
        let url = config
            .network
            .rpc_url()
            .ok_or_else(|| TipError::Config("no RPC URL configured".into()))?;
        Ok(Self::new(url)
            .map_err(|e| TipError::Config(e.to_string()))?
            .with_confirmation_poll(config.confirmation_poll))
    }

    pub fn with_confirmation_poll(mut self, period: Duration) -> Self {
        self.confirmation_poll = period;
        self
    }

    pub fn url(&self) -> &str { &self.url }

    /// One JSON-RPC call. A `null` result deserializes into `T` as-is, so
    /// `Option<_>` results pass through.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!("rpc {} -> {}", method, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("{}: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!("{}: HTTP {}: {}", method, status.as_u16(), text)));
        }

        let reply: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("{}: {}", method, e)))?;
        if let Some(err) = reply.error {
            return Err(ProviderError::from_code(err.code, err.message, None));
        }
        serde_json::from_value(reply.result).map_err(|e| ProviderError::Decode(format!("{}: {}", method, e)))
    }

    pub async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.call::<U64>("eth_chainId", json!([])).await?.to::<u64>())
    }

    pub async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.call("eth_accounts", json!([])).await
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn balance(&self, address: Address) -> Result<U256, ProviderError> {
        self.call("eth_getBalance", json!([address, "latest"])).await
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<U256, ProviderError> {
        self.call("eth_estimateGas", json!([tx])).await
    }

    async fn gas_price(&self) -> Result<U256, ProviderError> {
        self.call("eth_gasPrice", json!([])).await
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        Ok(self.call::<U64>("eth_blockNumber", json!([])).await?.to::<u64>())
    }

    async fn wait_for_confirmation(&self, hash: B256) -> Result<(), ProviderError> {
        loop {
            let receipt: Option<Receipt> = self.call("eth_getTransactionReceipt", json!([hash])).await?;
            if let Some(receipt) = receipt.filter(|r| r.block_number.is_some()) {
                return match receipt.status {
                    Some(status) if status.is_zero() => Err(ProviderError::Reverted(hash.to_string())),
                    _ => Ok(()),
                };
            }
            tokio::time::sleep(self.confirmation_poll).await;
        }
    }
}
