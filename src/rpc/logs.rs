//! LogEventSource - `Tipped` events from `eth_getLogs`, live by polling.

use alloy_primitives::{Address, U256};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::RpcClient;
use crate::contract::{decode_tip_log, LogEntry, TipJar};
use crate::error::ProviderError;
use crate::provider::{ChainClient, TipEventSource};
use crate::types::{TipEvent, TipFilter, TxRequest};

pub struct LogEventSource {
    rpc: RpcClient,
    tip_jar: TipJar,
    poll: Duration,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl LogEventSource {
    pub fn new(rpc: RpcClient, tip_jar: TipJar, poll: Duration) -> Self {
        Self { rpc, tip_jar, poll, subscriptions: Mutex::new(Vec::new()) }
    }

    /// Live subscription pollers still running.
    pub fn active_subscriptions(&self) -> usize {
        let mut subs = self.subscriptions.lock().unwrap_or_else(|p| p.into_inner());
        subs.retain(|h| !h.is_finished());
        subs.len()
    }
}

/// Decoded `Tipped` events in `[from_block, to_block]` matching `filter`.
/// Undecodable logs are skipped.
async fn fetch_events(
    rpc: &RpcClient,
    tip_jar: &TipJar,
    filter: TipFilter,
    from_block: u64,
    to_block: Option<u64>,
) -> Result<Vec<TipEvent>, ProviderError> {
    let Some(log_filter) = tip_jar.log_filter(from_block, to_block) else { return Ok(Vec::new()) };
    let logs: Vec<LogEntry> = rpc.call("eth_getLogs", json!([log_filter])).await?;
    Ok(logs
        .iter()
        .filter_map(|log| match decode_tip_log(log) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("skipping log: {}", e);
                None
            }
        })
        .filter(|event| filter.matches(event))
        .collect())
}

/// Forward events from `next` up to the current head; returns the block
/// the following poll starts from.
async fn forward_new_events(
    rpc: &RpcClient,
    tip_jar: &TipJar,
    filter: TipFilter,
    next: u64,
    tx: &mpsc::UnboundedSender<TipEvent>,
) -> anyhow::Result<u64> {
    let head = rpc.block_number().await.context("eth_blockNumber")?;
    if head < next {
        return Ok(next);
    }
    let events = fetch_events(rpc, tip_jar, filter, next, Some(head))
        .await
        .with_context(|| format!("eth_getLogs {}..{}", next, head))?;
    for event in events {
        if tx.send(event).is_err() {
            break;
        }
    }
    Ok(head + 1)
}

#[async_trait]
impl TipEventSource for LogEventSource {
    async fn subscribe(&self, filter: TipFilter) -> Result<mpsc::UnboundedReceiver<TipEvent>, ProviderError> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.tip_jar.is_native() {
            // Plain transfers emit no events; the receiver closes immediately.
            return Ok(rx);
        }
        let mut next = self.rpc.block_number().await? + 1;
        let rpc = self.rpc.clone();
        let tip_jar = self.tip_jar;
        let poll = self.poll;

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll).await;
                if tx.is_closed() {
                    break;
                }
                match forward_new_events(&rpc, &tip_jar, filter, next, &tx).await {
                    Ok(resume) => next = resume,
                    Err(e) => warn!("log poll failed: {:#}", e),
                }
            }
        });
        self.subscriptions.lock().unwrap_or_else(|p| p.into_inner()).push(handle);
        Ok(rx)
    }

    async fn query(&self, filter: TipFilter, from_block: u64) -> Result<Vec<TipEvent>, ProviderError> {
        fetch_events(&self.rpc, &self.tip_jar, filter, from_block, None).await
    }

    fn unsubscribe_all(&self) {
        let mut subs = self.subscriptions.lock().unwrap_or_else(|p| p.into_inner());
        for handle in subs.drain(..) {
            handle.abort();
        }
    }

    fn tip_transaction(&self, from: Address, to: Address, value: U256, message: &str) -> TxRequest {
        self.tip_jar.tip_transaction(from, to, value, message)
    }
}

impl Drop for LogEventSource {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}
