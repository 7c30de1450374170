//! NodeWallet - a wallet provider over accounts the node itself manages
//! (dev nodes, `--unlock`ed accounts). Notifications come from polling.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::RpcClient;
use crate::config::NetworkConfig;
use crate::error::ProviderError;
use crate::provider::{ProviderEvent, WalletProvider};
use crate::types::TxRequest;

pub struct NodeWallet {
    rpc: RpcClient,
    events: broadcast::Sender<ProviderEvent>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl NodeWallet {
    pub fn new(rpc: RpcClient) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { rpc, events, watcher: Mutex::new(None) }
    }

    /// Poll accounts and chain id every `period` and broadcast changes.
    /// Calling again restarts the watcher.
    pub fn start(&self, period: Duration) {
        let rpc = self.rpc.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut last_accounts: Option<Vec<Address>> = None;
            let mut last_chain: Option<u64> = None;
            loop {
                match rpc.accounts().await {
                    Ok(accounts) => {
                        if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                            info!("node accounts changed ({} exposed)", accounts.len());
                            let _ = events.send(ProviderEvent::AccountsChanged(accounts.clone()));
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(e) => warn!("account poll failed: {}", e),
                }
                match rpc.chain_id().await {
                    Ok(chain_id) => {
                        if last_chain.is_some_and(|prev| prev != chain_id) {
                            info!("node chain changed to {}", chain_id);
                            let _ = events.send(ProviderEvent::ChainChanged(chain_id));
                        }
                        last_chain = Some(chain_id);
                    }
                    Err(e) => warn!("chain poll failed: {}", e),
                }
                tokio::time::sleep(period).await;
            }
        });
        let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = watcher.replace(handle) {
            previous.abort();
        }
    }

    pub fn shutdown(&self) {
        let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = watcher.take() {
            handle.abort();
        }
    }
}

impl Drop for NodeWallet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl WalletProvider for NodeWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.rpc.accounts().await
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.rpc.chain_id().await
    }

    /// A node serves exactly one chain: switching succeeds only if it is
    /// already that chain.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        if self.rpc.chain_id().await? == chain_id {
            Ok(())
        } else {
            Err(ProviderError::UnrecognizedChain(chain_id))
        }
    }

    async fn add_chain(&self, network: &NetworkConfig) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported(format!("node wallet cannot register chain {}", network.chain_id_hex())))
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, ProviderError> {
        self.rpc.call("eth_sendTransaction", json!([tx])).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
