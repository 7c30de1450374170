//! In-memory wallet, chain and tip event source for tests and demos.
//!
//! One `MockWallet` implements all three collaborator traits, counts every
//! call that would hit the network, and lets tests script failures, push
//! provider notifications, and hold transaction confirmations.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::{NetworkConfig, SOMNIA_TESTNET_CHAIN_ID};
use crate::contract::TipJar;
use crate::error::ProviderError;
use crate::provider::{ChainClient, ProviderEvent, TipEventSource, WalletProvider};
use crate::types::{TipEvent, TipFilter, TxRequest};

#[derive(Default)]
struct MockState {
    accounts: Vec<Address>,
    balance: U256,
    gas: Option<U256>,
    gas_price: U256,
    accounts_error: Option<ProviderError>,
    balance_failures: usize,
    chain_id_failures: usize,
    send_error: Option<ProviderError>,
    switch_script: VecDeque<Result<(), ProviderError>>,
    add_chain_error: Option<ProviderError>,
    confirmation_error: Option<ProviderError>,
    history: Vec<TipEvent>,
    subscribers: Vec<(TipFilter, mpsc::UnboundedSender<TipEvent>)>,
    sent: Vec<TxRequest>,
    added_chains: Vec<NetworkConfig>,
    queries: Vec<u64>,
    calls: HashMap<&'static str, usize>,
}

pub struct MockWallet {
    state: Mutex<MockState>,
    chain_id: AtomicU64,
    block: AtomicU64,
    next_hash: AtomicU64,
    tip_jar: TipJar,
    provider_events: broadcast::Sender<ProviderEvent>,
    confirmations_open: watch::Sender<bool>,
    accounts_open: watch::Sender<bool>,
}

impl Default for MockWallet {
    fn default() -> Self { Self::new() }
}

impl MockWallet {
    /// No accounts, Somnia chain id, zero balance, block 0, confirmations
    /// released, gas estimation unavailable.
    pub fn new() -> Self {
        let (provider_events, _) = broadcast::channel(16);
        let (confirmations_open, _) = watch::channel(true);
        let (accounts_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(MockState::default()),
            chain_id: AtomicU64::new(SOMNIA_TESTNET_CHAIN_ID),
            block: AtomicU64::new(0),
            next_hash: AtomicU64::new(1),
            tip_jar: TipJar::default(),
            provider_events,
            confirmations_open,
            accounts_open,
        }
    }

    pub fn with_account(self, address: Address) -> Self {
        self.lock().accounts = vec![address];
        self
    }

    pub fn with_balance(self, balance: U256) -> Self {
        self.set_balance(balance);
        self
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.set_chain_id(chain_id);
        self
    }

    pub fn with_block(self, block: u64) -> Self {
        self.block.store(block, Ordering::SeqCst);
        self
    }

    pub fn with_gas(self, gas: U256, gas_price: U256) -> Self {
        {
            let mut state = self.lock();
            state.gas = Some(gas);
            state.gas_price = gas_price;
        }
        self
    }

    pub fn with_tip_jar(mut self, tip_jar: TipJar) -> Self {
        self.tip_jar = tip_jar;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn count(&self, method: &'static str) {
        *self.lock().calls.entry(method).or_default() += 1;
    }

    /// Calls made to `method`, by trait method name.
    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or_default()
    }

    /// Calls across every network-facing method.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) { self.lock().accounts = accounts; }
    pub fn set_balance(&self, balance: U256) { self.lock().balance = balance; }
    pub fn set_chain_id(&self, chain_id: u64) { self.chain_id.store(chain_id, Ordering::SeqCst); }
    pub fn set_block(&self, block: u64) { self.block.store(block, Ordering::SeqCst); }

    pub fn fail_accounts(&self, error: ProviderError) { self.lock().accounts_error = Some(error); }
    /// Fail the next `times` balance reads.
    pub fn fail_balance(&self, times: usize) { self.lock().balance_failures = times; }
    /// Fail the next `times` chain id reads.
    pub fn fail_chain_id(&self, times: usize) { self.lock().chain_id_failures = times; }
    pub fn fail_send(&self, error: ProviderError) { self.lock().send_error = Some(error); }
    pub fn fail_add_chain(&self, error: ProviderError) { self.lock().add_chain_error = Some(error); }
    pub fn fail_confirmation(&self, error: ProviderError) { self.lock().confirmation_error = Some(error); }

    /// Queue results for upcoming `switch_chain` calls. An empty queue
    /// switches successfully.
    pub fn script_switch(&self, results: impl IntoIterator<Item = Result<(), ProviderError>>) {
        self.lock().switch_script.extend(results);
    }

    /// Block `wait_for_confirmation` until [`Self::release_confirmations`].
    pub fn hold_confirmations(&self) { self.confirmations_open.send_replace(false); }
    pub fn release_confirmations(&self) { self.confirmations_open.send_replace(true); }

    /// Block `request_accounts` until [`Self::release_accounts`], like a
    /// wallet popup the user has not answered yet.
    pub fn hold_accounts(&self) { self.accounts_open.send_replace(false); }
    pub fn release_accounts(&self) { self.accounts_open.send_replace(true); }

    /// Push a wallet notification to subscribers.
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.provider_events.send(event);
    }

    /// Add an event to the history returned by `query`.
    pub fn add_history(&self, event: TipEvent) { self.lock().history.push(event); }

    /// Deliver an event to every live subscription whose filter matches.
    pub fn deliver(&self, event: TipEvent) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state
            .subscribers
            .iter()
            .filter(|(filter, _)| filter.matches(&event))
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.len()
    }

    pub fn sent(&self) -> Vec<TxRequest> { self.lock().sent.clone() }
    pub fn added_chains(&self) -> Vec<NetworkConfig> { self.lock().added_chains.clone() }

    /// `from_block` of every historical query, in call order.
    pub fn queries(&self) -> Vec<u64> { self.lock().queries.clone() }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.count("request_accounts");
        let mut open = self.accounts_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| ProviderError::Transport("mock dropped".into()))?;
        let state = self.lock();
        match &state.accounts_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.accounts.clone()),
        }
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.count("chain_id");
        if take_failure(&mut self.lock().chain_id_failures) {
            return Err(ProviderError::Transport("eth_chainId unavailable".into()));
        }
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.count("switch_chain");
        let scripted = self.lock().switch_script.pop_front();
        match scripted {
            Some(Err(e)) => Err(e),
            _ => {
                self.set_chain_id(chain_id);
                Ok(())
            }
        }
    }

    async fn add_chain(&self, network: &NetworkConfig) -> Result<(), ProviderError> {
        self.count("add_chain");
        let mut state = self.lock();
        state.added_chains.push(network.clone());
        match &state.add_chain_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, ProviderError> {
        self.count("send_transaction");
        let mut state = self.lock();
        if let Some(e) = &state.send_error {
            return Err(e.clone());
        }
        state.sent.push(tx);
        let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
        Ok(B256::left_padding_from(&n.to_be_bytes()))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.provider_events.subscribe()
    }
}

#[async_trait]
impl ChainClient for MockWallet {
    async fn balance(&self, _address: Address) -> Result<U256, ProviderError> {
        self.count("balance");
        let mut state = self.lock();
        if take_failure(&mut state.balance_failures) {
            return Err(ProviderError::Transport("eth_getBalance unavailable".into()));
        }
        Ok(state.balance)
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<U256, ProviderError> {
        self.count("estimate_gas");
        self.lock().gas.ok_or_else(|| ProviderError::Unsupported("eth_estimateGas".into()))
    }

    async fn gas_price(&self) -> Result<U256, ProviderError> {
        self.count("gas_price");
        Ok(self.lock().gas_price)
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.count("block_number");
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn wait_for_confirmation(&self, hash: B256) -> Result<(), ProviderError> {
        self.count("wait_for_confirmation");
        let mut open = self.confirmations_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| ProviderError::Transport("mock dropped".into()))?;
        match self.lock().confirmation_error.clone() {
            Some(ProviderError::Reverted(_)) => Err(ProviderError::Reverted(hash.to_string())),
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TipEventSource for MockWallet {
    async fn subscribe(&self, filter: TipFilter) -> Result<mpsc::UnboundedReceiver<TipEvent>, ProviderError> {
        self.count("subscribe_events");
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push((filter, tx));
        Ok(rx)
    }

    async fn query(&self, filter: TipFilter, from_block: u64) -> Result<Vec<TipEvent>, ProviderError> {
        self.count("query");
        let mut state = self.lock();
        state.queries.push(from_block);
        Ok(state
            .history
            .iter()
            .filter(|e| e.block_number >= from_block && filter.matches(e))
            .cloned()
            .collect())
    }

    fn unsubscribe_all(&self) {
        self.lock().subscribers.clear();
    }

    fn tip_transaction(&self, from: Address, to: Address, value: U256, message: &str) -> TxRequest {
        self.tip_jar.tip_transaction(from, to, value, message)
    }
}

fn take_failure(remaining: &mut usize) -> bool {
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}
