//! Session Manager - wallet connection lifecycle and tip reconciliation.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──accounts+chain──▶ Connected
//!       ▲                         │                              │
//!       └──── error / superseded ─┘      disconnect() / no accounts / chain changed
//!       ▲                                                        │
//!       └────────────────────────────────────────────────────────┘
//! ```
//!
//! While connected the manager runs a balance poller, a network poller, a
//! provider event listener and a tip event drain. Every task is tagged with
//! the session generation it was started for; disconnect bumps the
//! generation and aborts the tasks, and any late result carrying an old
//! generation is dropped.

pub mod ledger;

use alloy_primitives::{Address, B256, U256};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TipJarConfig;
use crate::contract::TipJar;
use crate::error::{ProviderError, TipError};
use crate::provider::{ChainClient, ProviderEvent, TipEventSource, WalletProvider};
use crate::types::{Session, SessionSnapshot, SessionStatus, TipEvent, TipFilter, TipRecord, TxRequest};
use crate::units::{format_amount, parse_address, parse_amount};

pub use ledger::{MergeOutcome, TipLedger, TipSummary};

#[derive(Default)]
struct State {
    status: SessionStatus,
    session: Option<Session>,
    network_correct: bool,
    balance: Option<U256>,
    ledger: TipLedger,
    reload_required: bool,
    /// Bumped on every connect attempt and teardown.
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
}

impl State {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            session: self.session,
            network_correct: self.network_correct,
            balance: self.balance.map(format_amount),
            transactions: self.ledger.records().to_vec(),
            reload_required: self.reload_required,
        }
    }
}

struct Inner {
    config: TipJarConfig,
    wallet: Option<Arc<dyn WalletProvider>>,
    chain: Arc<dyn ChainClient>,
    events: Option<Arc<dyn TipEventSource>>,
    state: Mutex<State>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &State) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Run `f` against the state only if `generation` is still current, then
    /// publish. `None` means the session moved on.
    fn with_current<R>(&self, generation: u64, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        let mut state = self.lock();
        if state.generation != generation {
            return None;
        }
        let out = f(&mut state);
        self.publish(&state);
        Some(out)
    }

    /// Keep `handle` for teardown, or abort it right away if its session is gone.
    fn track(&self, generation: u64, handle: JoinHandle<()>) {
        let mut state = self.lock();
        if state.generation != generation {
            handle.abort();
            return;
        }
        state.tasks.retain(|h| !h.is_finished());
        state.tasks.push(handle);
    }

    fn teardown(&self, state: &mut State) {
        state.generation += 1;
        for handle in state.tasks.drain(..) {
            handle.abort();
        }
        if let Some(events) = &self.events {
            events.unsubscribe_all();
        }
        state.status = SessionStatus::Disconnected;
        state.session = None;
        state.network_correct = false;
        state.balance = None;
        state.ledger.clear();
    }

    fn apply_balance(&self, generation: u64, balance: U256) {
        self.with_current(generation, |s| s.balance = Some(balance));
    }

    /// Record the wallet's current chain. Returns whether it is the target.
    fn apply_chain(&self, generation: u64, chain_id: u64) -> bool {
        let correct = chain_id == self.config.chain_id();
        self.with_current(generation, |s| {
            if let Some(session) = s.session.as_mut() {
                session.chain_id = chain_id;
            }
            s.network_correct = correct;
        });
        correct
    }

    fn merge_event(&self, generation: u64, address: Address, event: &TipEvent) -> Option<MergeOutcome> {
        self.with_current(generation, |s| s.ledger.apply_event(event, address))
    }

    fn tip_transaction(&self, from: Address, to: Address, value: U256, message: &str) -> TxRequest {
        match &self.events {
            Some(events) => events.tip_transaction(from, to, value, message),
            None => TipJar::new(self.config.contract).tip_transaction(from, to, value, message),
        }
    }

    async fn network_fee(&self, tx: &TxRequest) -> Result<U256, TipError> {
        let gas = self.chain.estimate_gas(tx).await.map_err(|e| TipError::EstimationFailed(e.to_string()))?;
        let price = self.chain.gas_price().await.map_err(|e| TipError::EstimationFailed(e.to_string()))?;
        gas.checked_mul(price).ok_or_else(|| TipError::EstimationFailed("fee overflow".into()))
    }

    /// Network fee, or the configured fallback when it cannot be estimated.
    async fn fee_or_fallback(&self, tx: &TxRequest) -> U256 {
        match self.network_fee(tx).await {
            Ok(fee) => fee,
            Err(e) => {
                warn!(error = %e, "fee estimate unavailable, using fallback");
                self.config.fallback_fee
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handle in state.tasks.drain(..) {
            handle.abort();
        }
    }
}

/// Owns the wallet session and its tip records. Cheap to clone; clones
/// share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// `wallet: None` models an environment without an injected wallet.
    /// `events: None` disables reconciliation; tips are then built from
    /// `config.contract` directly.
    pub fn new(
        config: TipJarConfig,
        wallet: Option<Arc<dyn WalletProvider>>,
        chain: Arc<dyn ChainClient>,
        events: Option<Arc<dyn TipEventSource>>,
    ) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                config,
                wallet,
                chain,
                events,
                state: Mutex::new(State::default()),
                snapshots,
            }),
        }
    }

    pub fn config(&self) -> &TipJarConfig { &self.inner.config }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> { self.inner.snapshots.subscribe() }

    pub fn snapshot(&self) -> SessionSnapshot { self.inner.lock().snapshot() }

    pub fn status(&self) -> SessionStatus { self.inner.lock().status }

    pub fn session(&self) -> Option<Session> { self.inner.lock().session }

    /// Newest first.
    pub fn transactions(&self) -> Vec<TipRecord> { self.inner.lock().ledger.records().to_vec() }

    pub fn search(&self, query: &str) -> Vec<TipRecord> { self.inner.lock().ledger.search(query) }

    pub fn summary(&self) -> TipSummary { self.inner.lock().ledger.summary() }

    fn wallet(&self) -> Result<Arc<dyn WalletProvider>, TipError> {
        self.inner.wallet.clone().ok_or(TipError::NoProviderAvailable)
    }

    fn require_connected(&self) -> Result<(u64, Session), TipError> {
        let state = self.inner.lock();
        match (state.status, state.session) {
            (SessionStatus::Connected, Some(session)) => Ok((state.generation, session)),
            _ => Err(TipError::NotConnected),
        }
    }

    /// Request account access and establish the session.
    ///
    /// A call while another connect is in flight, or while already
    /// connected, returns immediately. Resolves after the historical
    /// backfill has been merged.
    pub async fn connect(&self) -> Result<(), TipError> {
        let wallet = self.wallet()?;
        let (generation, provider_events) = {
            let mut state = self.inner.lock();
            match state.status {
                SessionStatus::Connecting => {
                    debug!("connect already in flight");
                    return Ok(());
                }
                SessionStatus::Connected => return Ok(()),
                SessionStatus::Disconnected => {}
            }
            state.generation += 1;
            state.status = SessionStatus::Connecting;
            state.reload_required = false;
            self.inner.publish(&state);
            // Subscribe before the first provider call so a notification
            // raised while establishing is still seen by this session.
            (state.generation, wallet.subscribe())
        };

        let (session, balance) = match self.establish(wallet.as_ref()).await {
            Ok(established) => established,
            Err(e) => {
                self.inner.with_current(generation, |s| s.status = SessionStatus::Disconnected);
                warn!(error = %e, "connect failed");
                return Err(e);
            }
        };

        let target = self.inner.config.chain_id();
        let applied = self.inner.with_current(generation, |s| {
            if s.status != SessionStatus::Connecting {
                return false;
            }
            s.status = SessionStatus::Connected;
            s.session = Some(session);
            s.network_correct = session.chain_id == target;
            s.balance = balance;
            true
        });
        if applied != Some(true) {
            debug!(address = %session.address, "connect superseded, result discarded");
            return Err(TipError::ConnectionFailed("superseded by disconnect".into()));
        }
        info!(address = %session.address, chain_id = session.chain_id, network_correct = session.chain_id == target, "wallet connected");

        self.spawn_pollers(generation, session.address);
        self.spawn_provider_listener(generation, provider_events);
        self.start_reconciliation(generation, session.address).await;
        Ok(())
    }

    async fn establish(&self, wallet: &dyn WalletProvider) -> Result<(Session, Option<U256>), TipError> {
        let accounts = wallet.request_accounts().await.map_err(connect_error)?;
        let address = accounts
            .first()
            .copied()
            .ok_or_else(|| TipError::ConnectionFailed("wallet returned no accounts".into()))?;
        let chain_id = wallet.chain_id().await.map_err(connect_error)?;
        let balance = match self.inner.chain.balance(address).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(%address, error = %e, "initial balance fetch failed");
                None
            }
        };
        Ok((Session { address, chain_id }, balance))
    }

    /// Clear the session and its records and stop all background work.
    /// Makes no network calls.
    pub fn disconnect(&self) {
        let mut state = self.inner.lock();
        let was_connected = state.status != SessionStatus::Disconnected;
        self.inner.teardown(&mut state);
        state.reload_required = false;
        self.inner.publish(&state);
        if was_connected {
            info!("wallet disconnected");
        }
    }

    /// Tear down only if `generation` is still the live session.
    fn teardown_if(&self, generation: u64, reload_required: bool) -> bool {
        let mut state = self.inner.lock();
        if state.generation != generation {
            return false;
        }
        self.inner.teardown(&mut state);
        state.reload_required = reload_required;
        self.inner.publish(&state);
        true
    }

    /// Ask the wallet to move to the target chain, registering it first if
    /// the wallet does not know it. Returns the re-queried network
    /// correctness.
    pub async fn switch_network(&self) -> Result<bool, TipError> {
        let (generation, _) = self.require_connected()?;
        let wallet = self.wallet()?;
        let target = self.inner.config.chain_id();

        match wallet.switch_chain(target).await {
            Ok(()) => {}
            Err(ProviderError::UnrecognizedChain(_)) => {
                info!(chain_id = target, "chain unknown to wallet, registering it");
                wallet.add_chain(&self.inner.config.network).await.map_err(switch_error)?;
                wallet.switch_chain(target).await.map_err(switch_error)?;
            }
            Err(e) => return Err(switch_error(e)),
        }

        let chain_id = wallet.chain_id().await.map_err(switch_error)?;
        let correct = self.inner.apply_chain(generation, chain_id);
        info!(chain_id, network_correct = correct, "network switch requested");
        Ok(correct)
    }

    /// Validate, check funds, and submit a tip. Returns the transaction hash
    /// as soon as the wallet acknowledged the submission; confirmation is
    /// tracked in the background and refreshes the balance when it lands.
    pub async fn send_tip(&self, recipient: &str, amount: &str, message: &str) -> Result<B256, TipError> {
        let to = parse_address(recipient)?;
        let value = parse_amount(amount)?;
        let (generation, session) = self.require_connected()?;
        let wallet = self.wallet()?;
        let target = self.inner.config.chain_id();

        let chain_id = wallet.chain_id().await.map_err(|e| TipError::SubmissionFailed(e.to_string()))?;
        if !self.inner.apply_chain(generation, chain_id) {
            return Err(TipError::WrongNetwork { expected: target, actual: chain_id });
        }

        let balance = self
            .inner
            .chain
            .balance(session.address)
            .await
            .map_err(|e| TipError::SubmissionFailed(e.to_string()))?;
        self.inner.apply_balance(generation, balance);

        let tx = self.inner.tip_transaction(session.address, to, value, message);
        let required = value.saturating_add(self.inner.fee_or_fallback(&tx).await);
        if balance < required {
            return Err(TipError::InsufficientBalance {
                available: format_amount(balance),
                required: format_amount(required),
            });
        }

        let hash = wallet.send_transaction(tx).await.map_err(|e| {
            if e.is_rejection() {
                TipError::UserRejected
            } else {
                TipError::SubmissionFailed(e.to_string())
            }
        })?;
        info!(%hash, %to, amount = %format_amount(value), "tip submitted");

        let record = TipRecord::optimistic(hash, session.address, to, value, Some(message.to_string()), unix_now());
        self.inner.with_current(generation, |s| s.ledger.insert_optimistic(record));
        self.spawn_confirmation(generation, session.address, hash);
        Ok(hash)
    }

    /// Advisory fee for a tip, in base units. Never fails: any problem
    /// yields the configured fallback fee.
    pub async fn estimate_fee(&self, recipient: &str, amount: &str, message: &str) -> U256 {
        match self.try_estimate_fee(recipient, amount, message).await {
            Ok(fee) => fee,
            Err(e) => {
                warn!(error = %e, "fee estimate unavailable, using fallback");
                self.inner.config.fallback_fee
            }
        }
    }

    async fn try_estimate_fee(&self, recipient: &str, amount: &str, message: &str) -> Result<U256, TipError> {
        let to = parse_address(recipient)?;
        let value = parse_amount(amount)?;
        let (_, session) = self.require_connected()?;
        let target = self.inner.config.chain_id();
        let chain_id = self.wallet()?.chain_id().await.map_err(|e| TipError::EstimationFailed(e.to_string()))?;
        if chain_id != target {
            return Err(TipError::WrongNetwork { expected: target, actual: chain_id });
        }
        let tx = self.inner.tip_transaction(session.address, to, value, message);
        self.inner.network_fee(&tx).await
    }

    fn spawn_pollers(&self, generation: u64, address: Address) {
        let weak = Arc::downgrade(&self.inner);
        let interval = ticker(self.inner.config.balance_poll);
        let balance = tokio::spawn(poll_every(interval, weak, move |inner| async move {
            match inner.chain.balance(address).await {
                Ok(balance) => inner.apply_balance(generation, balance),
                Err(e) => warn!(%address, error = %e, "balance poll failed"),
            }
        }));
        self.inner.track(generation, balance);

        let Some(wallet) = self.inner.wallet.clone() else { return };
        let weak = Arc::downgrade(&self.inner);
        let interval = ticker(self.inner.config.network_poll);
        let network = tokio::spawn(poll_every(interval, weak, move |inner| {
            let wallet = wallet.clone();
            async move {
                match wallet.chain_id().await {
                    Ok(chain_id) => {
                        if !inner.apply_chain(generation, chain_id) {
                            warn!(chain_id, expected = inner.config.chain_id(), "wallet on wrong network");
                        }
                    }
                    Err(e) => warn!(error = %e, "network poll failed"),
                }
            }
        }));
        self.inner.track(generation, network);
    }

    fn spawn_provider_listener(&self, generation: u64, mut rx: broadcast::Receiver<ProviderEvent>) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "provider events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                SessionManager { inner }.handle_provider_event(generation, event);
            }
        });
        self.inner.track(generation, handle);
    }

    fn handle_provider_event(&self, generation: u64, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first().copied() {
                None => {
                    if self.teardown_if(generation, false) {
                        info!("wallet exposed no accounts, disconnected");
                    }
                }
                Some(address) => {
                    if self.session().map(|s| s.address) == Some(address) {
                        return;
                    }
                    if self.teardown_if(generation, false) {
                        info!(%address, "account switched, reconnecting");
                        let manager = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = manager.connect().await {
                                warn!(error = %e, "reconnect after account switch failed");
                            }
                        });
                    }
                }
            },
            ProviderEvent::ChainChanged(chain_id) => {
                if self.teardown_if(generation, true) {
                    warn!(chain_id, "chain changed, session state discarded");
                }
            }
        }
    }

    /// Subscribe to live tip events, then merge one bounded backfill.
    async fn start_reconciliation(&self, generation: u64, address: Address) {
        let Some(events) = self.inner.events.clone() else { return };
        let filter = TipFilter::involving(address);

        match events.subscribe(filter).await {
            Ok(rx) => {
                let handle = tokio::spawn(drain_events(Arc::downgrade(&self.inner), generation, address, rx));
                self.inner.track(generation, handle);
            }
            Err(e) => warn!(error = %e, "tip event subscription failed"),
        }

        if let Err(e) = self.backfill(generation, address, events.as_ref()).await {
            warn!(error = %e, "tip history backfill failed");
        }
    }

    async fn backfill(&self, generation: u64, address: Address, events: &dyn TipEventSource) -> Result<(), ProviderError> {
        let head = self.inner.chain.block_number().await?;
        let from_block = head.saturating_sub(self.inner.config.backfill_blocks);
        let history = events.query(TipFilter::involving(address), from_block).await?;
        let merged = self.inner.with_current(generation, |s| {
            history.iter().filter(|e| s.ledger.apply_event(e, address).changed()).count()
        });
        debug!(from_block, head, fetched = history.len(), merged = merged.unwrap_or(0), "tip history backfilled");
        Ok(())
    }

    fn spawn_confirmation(&self, generation: u64, address: Address, hash: B256) {
        let weak = Arc::downgrade(&self.inner);
        let chain = self.inner.chain.clone();
        let handle = tokio::spawn(async move {
            let outcome = chain.wait_for_confirmation(hash).await;
            let Some(inner) = weak.upgrade() else { return };
            match outcome {
                Ok(()) => {
                    debug!(%hash, "tip confirmed");
                    inner.with_current(generation, |s| s.ledger.mark_confirmed(hash));
                }
                Err(e) => {
                    warn!(%hash, error = %e, "tip not confirmed");
                    if matches!(e, ProviderError::Reverted(_)) {
                        inner.with_current(generation, |s| s.ledger.discard_optimistic(hash));
                    }
                }
            }
            match chain.balance(address).await {
                Ok(balance) => inner.apply_balance(generation, balance),
                Err(e) => warn!(%address, error = %e, "balance refresh after confirmation failed"),
            }
        });
        self.inner.track(generation, handle);
    }
}

/// Interval whose first tick is one `period` from now.
fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run `tick` on every tick of `interval`. A failed tick only logs; the loop
/// ends when the manager is dropped or the task is aborted.
async fn poll_every<F, Fut>(mut interval: Interval, weak: Weak<Inner>, tick: F)
where
    F: Fn(Arc<Inner>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    loop {
        interval.tick().await;
        let Some(inner) = weak.upgrade() else { break };
        tick(inner).await;
    }
}

async fn drain_events(weak: Weak<Inner>, generation: u64, address: Address, mut rx: mpsc::UnboundedReceiver<TipEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = weak.upgrade() else { break };
        match inner.merge_event(generation, address, &event) {
            Some(outcome) if outcome.changed() => debug!(hash = %event.tx_hash, ?outcome, "tip event merged"),
            Some(_) => {}
            None => break,
        }
    }
}

fn connect_error(e: ProviderError) -> TipError {
    if e.is_rejection() {
        TipError::UserRejected
    } else {
        TipError::ConnectionFailed(e.to_string())
    }
}

fn switch_error(e: ProviderError) -> TipError {
    if e.is_rejection() {
        TipError::UserRejected
    } else {
        TipError::NetworkSwitchFailed(e.to_string())
    }
}

fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}
