//! Tip jar configuration - constructed by higher layers, fixed for a session.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::TipError;

/// Somnia Testnet chain id (`0xC488`).
pub const SOMNIA_TESTNET_CHAIN_ID: u64 = 50312;
/// Deployed TipJar contract on Somnia Testnet.
pub const SOMNIA_TIP_JAR: &str = "0xE43727723D53085a249c74a9B15bEc50920bBFfF";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Target network metadata. Also the payload registered with a wallet that
/// does not know the chain yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self { Self::somnia_testnet() }
}

impl NetworkConfig {
    pub fn somnia_testnet() -> Self {
        Self {
            chain_id: SOMNIA_TESTNET_CHAIN_ID,
            chain_name: "Somnia Testnet".into(),
            native_currency: NativeCurrency { name: "Somnia Test Token".into(), symbol: "STT".into(), decimals: 18 },
            rpc_urls: vec!["https://dream-rpc.somnia.network".into()],
            block_explorer_urls: vec!["https://shannon-explorer.somnia.network".into()],
        }
    }

    /// Hex chain id as wallets expect it (`0xc488`).
    pub fn chain_id_hex(&self) -> String { format!("{:#x}", self.chain_id) }

    /// `wallet_addEthereumChain` parameter object.
    pub fn add_chain_params(&self) -> Value {
        json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.block_explorer_urls,
        })
    }

    pub fn rpc_url(&self) -> Option<&str> { self.rpc_urls.first().map(String::as_str) }
    pub fn explorer_url(&self) -> Option<&str> { self.block_explorer_urls.first().map(String::as_str) }
}

/// Session configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct TipJarConfig {
    pub network: NetworkConfig,
    /// TipJar contract. `None` sends plain native transfers.
    pub contract: Option<Address>,
    /// Historical backfill window, in blocks.
    pub backfill_blocks: u64,
    pub balance_poll: Duration,
    pub network_poll: Duration,
    /// Returned by fee estimation when the real estimate is unavailable.
    pub fallback_fee: U256,
    /// Receipt polling interval while waiting for confirmation.
    pub confirmation_poll: Duration,
    /// Log polling interval for live event subscriptions.
    pub event_poll: Duration,
}

impl Default for TipJarConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::somnia_testnet(),
            contract: Address::from_str(SOMNIA_TIP_JAR).ok(),
            backfill_blocks: 100,
            balance_poll: Duration::from_secs(15),
            network_poll: Duration::from_secs(30),
            // 0.0001 native units
            fallback_fee: U256::from(100_000_000_000_000u64),
            confirmation_poll: Duration::from_secs(2),
            event_poll: Duration::from_secs(4),
        }
    }
}

impl TipJarConfig {
    pub fn new() -> Self { Self::default() }
    pub fn with_network(mut self, n: NetworkConfig) -> Self { self.network = n; self }
    pub fn with_contract(mut self, c: Address) -> Self { self.contract = Some(c); self }
    pub fn native_transfers(mut self) -> Self { self.contract = None; self }
    pub fn with_backfill_blocks(mut self, blocks: u64) -> Self { self.backfill_blocks = blocks; self }
    pub fn with_balance_poll(mut self, d: Duration) -> Self { self.balance_poll = d; self }
    pub fn with_network_poll(mut self, d: Duration) -> Self { self.network_poll = d; self }
    pub fn with_fallback_fee(mut self, fee: U256) -> Self { self.fallback_fee = fee; self }
    pub fn with_confirmation_poll(mut self, d: Duration) -> Self { self.confirmation_poll = d; self }
    pub fn with_event_poll(mut self, d: Duration) -> Self { self.event_poll = d; self }

    pub fn chain_id(&self) -> u64 { self.network.chain_id }

    /// Overlay `TIPJAR_*` environment variables on the defaults.
    ///
    /// - `TIPJAR_CHAIN_ID` - decimal or `0x` hex chain id
    /// - `TIPJAR_CHAIN_NAME` - display name
    /// - `TIPJAR_RPC_URL` - comma separated RPC endpoints
    /// - `TIPJAR_EXPLORER_URL` - comma separated explorer base URLs
    /// - `TIPJAR_CONTRACT` - contract address, empty for native transfers
    /// - `TIPJAR_BACKFILL_BLOCKS` - backfill window in blocks
    pub fn from_env() -> Result<Self, TipError> {
        let mut config = Self::default();
        if let Some(raw) = env_value("TIPJAR_CHAIN_ID") {
            config.network.chain_id = parse_chain_id(&raw)
                .ok_or_else(|| TipError::Config(format!("TIPJAR_CHAIN_ID: {}", raw)))?;
        }
        if let Some(name) = env_value("TIPJAR_CHAIN_NAME") {
            config.network.chain_name = name;
        }
        if let Some(urls) = env_value("TIPJAR_RPC_URL") {
            config.network.rpc_urls = split_list(&urls);
        }
        if let Some(urls) = env_value("TIPJAR_EXPLORER_URL") {
            config.network.block_explorer_urls = split_list(&urls);
        }
        if let Ok(raw) = std::env::var("TIPJAR_CONTRACT") {
            let raw = raw.trim();
            config.contract = if raw.is_empty() {
                None
            } else {
                Some(Address::from_str(raw).map_err(|e| TipError::Config(format!("TIPJAR_CONTRACT: {}", e)))?)
            };
        }
        if let Some(raw) = env_value("TIPJAR_BACKFILL_BLOCKS") {
            config.backfill_blocks = raw
                .parse()
                .map_err(|_| TipError::Config(format!("TIPJAR_BACKFILL_BLOCKS: {}", raw)))?;
        }
        Ok(config)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

/// Parse a decimal or `0x`-prefixed hex chain id.
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

/// Load `KEY=VALUE` lines from a dotenv file without overriding variables that
/// are already set. Returns how many variables were applied.
pub fn load_dotenv(path: impl AsRef<Path>) -> usize {
    let Ok(contents) = std::fs::read_to_string(path) else { return 0 };
    let mut applied = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && std::env::var(key.trim()).is_err() {
                std::env::set_var(key.trim(), value);
                applied += 1;
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn clear_env() {
        for key in ["TIPJAR_CHAIN_ID", "TIPJAR_CHAIN_NAME", "TIPJAR_RPC_URL", "TIPJAR_EXPLORER_URL", "TIPJAR_CONTRACT", "TIPJAR_BACKFILL_BLOCKS", "TIPJAR_DOTENV_PROBE"] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_target_somnia() {
        let config = TipJarConfig::default();
        assert_eq!(config.chain_id(), 50312);
        assert_eq!(config.network.chain_id_hex(), "0xc488");
        assert!(config.contract.is_some());
        assert_eq!(config.backfill_blocks, 100);
        assert_eq!(config.balance_poll, Duration::from_secs(15));
        assert_eq!(config.network_poll, Duration::from_secs(30));
    }

    #[test]
    fn add_chain_params_shape() {
        let params = NetworkConfig::somnia_testnet().add_chain_params();
        assert_eq!(params["chainId"], "0xc488");
        assert_eq!(params["nativeCurrency"]["symbol"], "STT");
        assert_eq!(params["nativeCurrency"]["decimals"], 18);
        assert_eq!(params["rpcUrls"][0], "https://dream-rpc.somnia.network");
    }

    #[test]
    fn chain_id_parsing() {
        assert_eq!(parse_chain_id("0xC488"), Some(50312));
        assert_eq!(parse_chain_id("50312"), Some(50312));
        assert_eq!(parse_chain_id("nope"), None);
    }

    #[test]
    fn env_overlay() {
        let _guard = lock_env();
        clear_env();
        std::env::set_var("TIPJAR_CHAIN_ID", "0x7a69");
        std::env::set_var("TIPJAR_RPC_URL", "http://127.0.0.1:8545, http://127.0.0.1:8546");
        std::env::set_var("TIPJAR_CONTRACT", "");
        std::env::set_var("TIPJAR_BACKFILL_BLOCKS", "500");

        let config = TipJarConfig::from_env().expect("config");
        assert_eq!(config.chain_id(), 31337);
        assert_eq!(config.network.rpc_urls.len(), 2);
        assert!(config.contract.is_none());
        assert_eq!(config.backfill_blocks, 500);

        std::env::set_var("TIPJAR_BACKFILL_BLOCKS", "lots");
        assert!(matches!(TipJarConfig::from_env(), Err(TipError::Config(_))));
        clear_env();
    }

    #[test]
    fn dotenv_does_not_override() {
        let _guard = lock_env();
        clear_env();
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\nTIPJAR_CHAIN_NAME=\"Local\"\nTIPJAR_DOTENV_PROBE=1\n").expect("write");
        std::env::set_var("TIPJAR_CHAIN_NAME", "Preset");

        assert_eq!(load_dotenv(&path), 1);
        assert_eq!(std::env::var("TIPJAR_CHAIN_NAME").unwrap(), "Preset");
        assert_eq!(std::env::var("TIPJAR_DOTENV_PROBE").unwrap(), "1");
        assert_eq!(load_dotenv(dir.path().join("missing")), 0);
        clear_env();
    }
}
