//! Session and tip record types shared by the manager, adapters and API.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::units::format_amount;

/// Connection status of the wallet session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
        }
    }
}

/// An established wallet connection. Address and chain id always travel
/// together; a partially populated session cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub address: Address,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// A `Tipped` contract event as delivered by the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipEvent {
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    pub message: String,
    /// Block timestamp emitted by the contract, seconds since epoch.
    pub timestamp: u64,
}

impl TipEvent {
    pub fn involves(&self, address: Address) -> bool {
        self.from == address || self.to == address
    }
}

/// Which events a subscription or historical query should deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipFilter {
    /// Only events where this address is sender or recipient.
    pub participant: Address,
}

impl TipFilter {
    pub fn involving(participant: Address) -> Self { Self { participant } }
    pub fn matches(&self, event: &TipEvent) -> bool { event.involves(self.participant) }
}

/// One tip sent or received by the session address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipRecord {
    /// `{hash}-{log_index}` for chain events, `pending-{hash}` for optimistic entries.
    pub id: String,
    pub direction: Direction,
    pub counterparty: Address,
    pub from: Address,
    pub to: Address,
    /// Display units, exact ("1.5").
    pub amount: String,
    pub value: U256,
    pub message: Option<String>,
    pub timestamp: u64,
    pub hash: Option<B256>,
    pub log_index: Option<u64>,
    /// False until the transaction is known to be mined.
    pub confirmed: bool,
}

impl TipRecord {
    /// Build a record from a chain event, relative to `me`. Returns `None` for
    /// events that do not involve `me`.
    pub fn from_event(event: &TipEvent, me: Address) -> Option<Self> {
        if !event.involves(me) {
            return None;
        }
        let direction = if event.from == me { Direction::Sent } else { Direction::Received };
        let counterparty = match direction { Direction::Sent => event.to, Direction::Received => event.from };
        Some(Self {
            id: format!("{}-{}", event.tx_hash, event.log_index),
            direction,
            counterparty,
            from: event.from,
            to: event.to,
            amount: format_amount(event.amount),
            value: event.amount,
            message: Some(event.message.clone()).filter(|m| !m.is_empty()),
            timestamp: event.timestamp,
            hash: Some(event.tx_hash),
            log_index: Some(event.log_index),
            confirmed: true,
        })
    }

    /// Locally known data for a tip the provider has just acknowledged.
    pub fn optimistic(hash: B256, from: Address, to: Address, value: U256, message: Option<String>, timestamp: u64) -> Self {
        Self {
            id: format!("pending-{}", hash),
            direction: Direction::Sent,
            counterparty: to,
            from,
            to,
            amount: format_amount(value),
            value,
            message: message.filter(|m| !m.is_empty()),
            timestamp,
            hash: Some(hash),
            log_index: None,
            confirmed: false,
        }
    }

    /// True for records that still carry locally built data.
    pub fn is_optimistic(&self) -> bool { self.log_index.is_none() }
}

/// A transaction for the wallet to sign and submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    #[serde(default, skip_serializing_if = "no_data")]
    pub data: Bytes,
}

fn no_data(data: &Bytes) -> bool { data.is_empty() }

/// Everything a consumer renders from, published after every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session: Option<Session>,
    pub network_correct: bool,
    /// Display units.
    pub balance: Option<String>,
    /// Newest first.
    pub transactions: Vec<TipRecord>,
    /// Set after the provider reported a chain change; the consumer must
    /// rebuild its state from scratch.
    pub reload_required: bool,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool { self.status == SessionStatus::Connected }
    pub fn address(&self) -> Option<Address> { self.session.map(|s| s.address) }
}
