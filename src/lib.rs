//! Tipjar: wallet session and tip reconciliation for an EVM tip jar.
//!
//! # Architecture
//!
//! ```text
//! SessionManager (entry point)
//!   │
//!   ├── WalletProvider   request accounts, switch/add chain, sign + send
//!   ├── ChainClient      balance, gas, block number, confirmations
//!   ├── TipEventSource   live `Tipped` events + bounded backfill
//!   │
//!   └── TipLedger        records deduplicated by tx hash, newest first
//! ```
//!
//! Adapters: `rpc` (JSON-RPC node), `mock` (in-memory, for tests).
//! Surfaces: `server` (axum HTTP API) and the `tipjar` CLI.
//!
//! # Operations
//!
//! | Operation | Method | Notes |
//! |-----------|--------|-------|
//! | connect | `manager.connect()` | coalesced while pending |
//! | disconnect | `manager.disconnect()` | no network calls |
//! | switch network | `manager.switch_network()` | registers unknown chains once |
//! | send tip | `manager.send_tip(to, amount, message)` | returns after wallet ack |
//! | estimate fee | `manager.estimate_fee(to, amount, message)` | never fails |
//!
//! # Features
//!
//! - `native` - tokio runtime, session manager, JSON-RPC adapters, HTTP server
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tipjar::{RpcClient, NodeWallet, LogEventSource, SessionManager, TipJar, TipJarConfig};
//!
//! let config = TipJarConfig::from_env()?;
//! let rpc = RpcClient::from_config(&config)?;
//! let events = LogEventSource::new(rpc.clone(), TipJar::new(config.contract), config.event_poll);
//! let manager = SessionManager::new(
//!     config,
//!     Some(Arc::new(NodeWallet::new(rpc.clone()))),
//!     Arc::new(rpc),
//!     Some(Arc::new(events)),
//! );
//!
//! manager.connect().await?;
//! let hash = manager.send_tip("0xB0b...", "1.5", "thanks").await?;
//! ```

// =============================================================================
// Shared modules (compile everywhere)
// =============================================================================
pub mod config;
pub mod contract;
pub mod error;
pub mod link;
pub mod types;
pub mod units;

// =============================================================================
// Native-only modules (tokio, HTTP)
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;
#[cfg(feature = "native")]
pub mod mock;
#[cfg(feature = "native")]
pub mod provider;
#[cfg(feature = "native")]
pub mod rpc;
#[cfg(feature = "native")]
pub mod runtime;
#[cfg(feature = "native")]
pub mod server;
#[cfg(feature = "native")]
pub mod session;

// =============================================================================
// Re-exports: Shared
// =============================================================================
pub use config::{NativeCurrency, NetworkConfig, TipJarConfig};
pub use contract::TipJar;
pub use error::{ProviderError, TipError};
pub use link::TipLink;
pub use types::{Direction, Session, SessionSnapshot, SessionStatus, TipEvent, TipFilter, TipRecord, TxRequest};

// =============================================================================
// Re-exports: Native
// =============================================================================
#[cfg(feature = "native")]
pub use provider::{ChainClient, ProviderEvent, TipEventSource, WalletProvider};
#[cfg(feature = "native")]
pub use rpc::{LogEventSource, NodeWallet, RpcClient};
#[cfg(feature = "native")]
pub use runtime::{install_signal_handlers, Shutdown};
#[cfg(feature = "native")]
pub use server::create_router;
#[cfg(feature = "native")]
pub use session::{SessionManager, TipLedger, TipSummary};
