//! Collaborator traits: wallet provider, chain client, tip event source.
//!
//! The session manager only sees these capability sets. `rpc` implements
//! them over JSON-RPC, `mock` implements them in memory.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::config::NetworkConfig;
use crate::error::ProviderError;
use crate::types::{TipEvent, TipFilter, TxRequest};

/// Notifications pushed by the wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The exposed account list changed. Empty means the wallet disconnected.
    AccountsChanged(Vec<Address>),
    /// The wallet moved to another chain.
    ChainChanged(u64),
}

/// The injected wallet (EIP-1193 style).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the user for account access.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Ask the wallet to switch chains. `ProviderError::UnrecognizedChain`
    /// when the wallet does not know the chain.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    /// Register a network with the wallet.
    async fn add_chain(&self, network: &NetworkConfig) -> Result<(), ProviderError>;

    /// Sign and submit; resolves with the hash once the network acknowledged it.
    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, ProviderError>;

    /// Subscribe to account and chain notifications. Dropping the receiver
    /// is the unsubscribe.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Read access to the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Balance in base units.
    async fn balance(&self, address: Address) -> Result<U256, ProviderError>;

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<U256, ProviderError>;

    async fn gas_price(&self) -> Result<U256, ProviderError>;

    async fn block_number(&self) -> Result<u64, ProviderError>;

    /// Resolves once the transaction is mined. Errors when it reverted.
    async fn wait_for_confirmation(&self, hash: B256) -> Result<(), ProviderError>;
}

/// Source of `Tipped` events, plus the transaction that emits one.
#[async_trait]
pub trait TipEventSource: Send + Sync {
    /// Deliver new events matching `filter` until `unsubscribe_all` or the
    /// receiver is dropped.
    async fn subscribe(&self, filter: TipFilter) -> Result<mpsc::UnboundedReceiver<TipEvent>, ProviderError>;

    /// Events matching `filter` from `from_block` to the chain head.
    async fn query(&self, filter: TipFilter, from_block: u64) -> Result<Vec<TipEvent>, ProviderError>;

    /// Stop every live subscription. Local only, no network calls.
    fn unsubscribe_all(&self);

    /// Build the transaction that tips `to` with `value` and `message`.
    fn tip_transaction(&self, from: Address, to: Address, value: U256, message: &str) -> TxRequest;
}
