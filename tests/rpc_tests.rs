//! JSON-RPC adapters against an in-process stub node.
//!
//! Run with: cargo test --test rpc_tests

use alloy_primitives::{address, Address, B256, U256, U64};
use alloy_sol_types::SolValue;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tipjar::contract::{LogEntry, TipJar};
use tipjar::{
    ChainClient, LogEventSource, NodeWallet, ProviderError, ProviderEvent, RpcClient, SessionManager, TipEventSource,
    TipFilter, TipJarConfig, WalletProvider,
};

const ME: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1");
const BOB: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2");
const CAROL: Address = address!("ccccccccccccccccccccccccccccccccccccccc3");
const CONTRACT: Address = address!("e43727723d53085a249c74a9b15bec50920bbfff");
const ONE: u128 = 1_000_000_000_000_000_000;

// ============================================================================
// Stub node
// ============================================================================

#[derive(Default)]
struct Node {
    chain_id: u64,
    accounts: Vec<Address>,
    balance: U256,
    block: u64,
    logs: Vec<LogEntry>,
    receipts: HashMap<B256, Value>,
    sent: Vec<Value>,
    reject_sends: bool,
    calls: Vec<String>,
}

type Shared = Arc<Mutex<Node>>;

fn hex(n: u64) -> Value {
    json!(format!("{:#x}", n))
}

fn block_param(raw: &Value, latest: u64) -> u64 {
    match raw.as_str() {
        Some("latest") | None => latest,
        Some(s) => u64::from_str_radix(s.trim_start_matches("0x"), 16).unwrap_or(latest),
    }
}

async fn rpc(State(node): State<Shared>, Json(req): Json<Value>) -> Json<Value> {
    let id = req["id"].clone();
    let method = req["method"].as_str().unwrap_or_default().to_string();
    let params = req["params"].clone();
    let mut node = node.lock().unwrap();
    node.calls.push(method.clone());

    let result = match method.as_str() {
        "eth_chainId" => hex(node.chain_id),
        "eth_accounts" => json!(node.accounts),
        "eth_getBalance" => json!(format!("{:#x}", node.balance)),
        "eth_gasPrice" => hex(10_000_000_000),
        "eth_estimateGas" => hex(50_000),
        "eth_blockNumber" => hex(node.block),
        "eth_getTransactionReceipt" => {
            let hash: B256 = serde_json::from_value(params[0].clone()).unwrap();
            node.receipts.get(&hash).cloned().unwrap_or(Value::Null)
        }
        "eth_sendTransaction" => {
            if node.reject_sends {
                return Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": 4001, "message": "denied"}}));
            }
            node.sent.push(params[0].clone());
            json!(B256::repeat_byte(node.sent.len() as u8))
        }
        "eth_getLogs" => {
            let filter = &params[0];
            let from = block_param(&filter["fromBlock"], node.block);
            let to = block_param(&filter["toBlock"], node.block);
            let logs: Vec<&LogEntry> = node
                .logs
                .iter()
                .filter(|log| log.block_number.map(|b| b.to::<u64>()).is_some_and(|b| b >= from && b <= to))
                .collect();
            json!(logs)
        }
        other => {
            return Json(json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": format!("no {}", other)}}));
        }
    };
    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

async fn start_node() -> (Shared, String) {
    let node: Shared = Arc::new(Mutex::new(Node {
        chain_id: 50312,
        accounts: vec![ME],
        balance: U256::from(5 * ONE),
        block: 100,
        ..Default::default()
    }));
    let router = Router::new().route("/", post(rpc)).with_state(node.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (node, url)
}

fn tipped_log(from: Address, to: Address, amount: U256, message: &str, block: u64, tx: u8) -> LogEntry {
    let data = (amount, message.to_string(), U256::from(1_700_000_000u64 + block)).abi_encode_params();
    LogEntry {
        address: CONTRACT,
        topics: vec![TipJar::topic(), from.into_word(), to.into_word()],
        data: data.into(),
        block_number: Some(U64::from(block)),
        transaction_hash: Some(B256::repeat_byte(tx)),
        log_index: Some(U64::from(0)),
        removed: false,
    }
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// RpcClient
// ============================================================================

#[tokio::test]
async fn test_chain_reads() {
    let (_node, url) = start_node().await;
    let rpc = RpcClient::new(url).expect("client");

    assert_eq!(rpc.chain_id().await.unwrap(), 50312);
    assert_eq!(rpc.accounts().await.unwrap(), vec![ME]);
    assert_eq!(rpc.balance(ME).await.unwrap(), U256::from(5 * ONE));
    assert_eq!(rpc.gas_price().await.unwrap(), U256::from(10_000_000_000u64));
    assert_eq!(rpc.block_number().await.unwrap(), 100);
}

#[tokio::test]
async fn test_rpc_errors_classify() {
    let (node, url) = start_node().await;
    node.lock().unwrap().reject_sends = true;
    let wallet = NodeWallet::new(RpcClient::new(url.clone()).expect("client"));

    let tx = TipJar::new(None).tip_transaction(ME, BOB, U256::from(1u8), "");
    assert_eq!(wallet.send_transaction(tx).await, Err(ProviderError::Rejected));

    let rpc = RpcClient::new(url).expect("client");
    let err = rpc.call::<Value>("eth_mining", json!([])).await.unwrap_err();
    assert!(matches!(err, ProviderError::Rpc { code: -32601, .. }));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let rpc = RpcClient::new("http://127.0.0.1:1").expect("client");
    assert!(matches!(rpc.block_number().await, Err(ProviderError::Transport(_))));
}

#[tokio::test]
async fn test_wait_for_confirmation_polls_receipt() {
    let (node, url) = start_node().await;
    let rpc = RpcClient::new(url).expect("client").with_confirmation_poll(Duration::from_millis(10));
    let mined = B256::repeat_byte(0x11);
    let reverted = B256::repeat_byte(0x22);

    let waiter = {
        let rpc = rpc.clone();
        tokio::spawn(async move { rpc.wait_for_confirmation(mined).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "no receipt yet");

    node.lock().unwrap().receipts.insert(mined, json!({"status": "0x1", "blockNumber": "0x65"}));
    assert_eq!(waiter.await.unwrap(), Ok(()));

    node.lock().unwrap().receipts.insert(reverted, json!({"status": "0x0", "blockNumber": "0x66"}));
    assert!(matches!(rpc.wait_for_confirmation(reverted).await, Err(ProviderError::Reverted(_))));
}

// ============================================================================
// NodeWallet
// ============================================================================

#[tokio::test]
async fn test_node_wallet_chain_management() {
    let (_node, url) = start_node().await;
    let wallet = NodeWallet::new(RpcClient::new(url).expect("client"));

    assert_eq!(wallet.switch_chain(50312).await, Ok(()));
    assert_eq!(wallet.switch_chain(1).await, Err(ProviderError::UnrecognizedChain(1)));
    let network = TipJarConfig::default().network;
    assert!(matches!(wallet.add_chain(&network).await, Err(ProviderError::Unsupported(_))));
}

#[tokio::test]
async fn test_node_wallet_watcher_reports_changes() {
    let (node, url) = start_node().await;
    let wallet = NodeWallet::new(RpcClient::new(url).expect("client"));
    let mut events = wallet.subscribe();
    wallet.start(Duration::from_millis(10));

    assert!(eventually(|| node.lock().unwrap().calls.iter().filter(|m| *m == "eth_chainId").count() >= 2).await);
    node.lock().unwrap().accounts = vec![BOB];
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.expect("event").unwrap();
    assert_eq!(event, ProviderEvent::AccountsChanged(vec![BOB]));

    node.lock().unwrap().chain_id = 1;
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv()).await.expect("event").unwrap();
    assert_eq!(event, ProviderEvent::ChainChanged(1));

    wallet.shutdown();
}

// ============================================================================
// LogEventSource
// ============================================================================

#[tokio::test]
async fn test_log_query_filters_participant() {
    let (node, url) = start_node().await;
    {
        let mut node = node.lock().unwrap();
        node.logs.push(tipped_log(BOB, ME, U256::from(ONE), "hi", 90, 1));
        node.logs.push(tipped_log(BOB, CAROL, U256::from(ONE), "not me", 91, 2));
        let mut removed = tipped_log(ME, BOB, U256::from(ONE), "reorged", 92, 3);
        removed.removed = true;
        node.logs.push(removed);
    }
    let source = LogEventSource::new(RpcClient::new(url).expect("client"), TipJar::new(Some(CONTRACT)), Duration::from_millis(10));

    let events = source.query(TipFilter::involving(ME), 0).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].from, BOB);
    assert_eq!(events[0].message, "hi");
    assert_eq!(events[0].block_number, 90);

    assert!(source.query(TipFilter::involving(ME), 91).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_log_subscription_delivers_new_blocks() {
    let (node, url) = start_node().await;
    let source = LogEventSource::new(RpcClient::new(url).expect("client"), TipJar::new(Some(CONTRACT)), Duration::from_millis(10));
    let mut rx = source.subscribe(TipFilter::involving(ME)).await.unwrap();
    assert_eq!(source.active_subscriptions(), 1);

    {
        let mut node = node.lock().unwrap();
        // Already-seen block: not delivered live.
        node.logs.push(tipped_log(BOB, ME, U256::from(ONE), "old", 100, 1));
        node.logs.push(tipped_log(CAROL, ME, U256::from(2 * ONE), "new", 101, 2));
        node.block = 101;
    }
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.expect("event").unwrap();
    assert_eq!(event.from, CAROL);
    assert_eq!(event.message, "new");

    source.unsubscribe_all();
    assert_eq!(source.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_native_mode_has_no_events() {
    let (node, url) = start_node().await;
    let source = LogEventSource::new(RpcClient::new(url).expect("client"), TipJar::new(None), Duration::from_millis(10));
    let mut rx = source.subscribe(TipFilter::involving(ME)).await.unwrap();
    assert_eq!(rx.recv().await, None);
    assert!(source.query(TipFilter::involving(ME), 0).await.unwrap().is_empty());
    assert!(!node.lock().unwrap().calls.iter().any(|m| m == "eth_getLogs"));
}

// ============================================================================
// Session over JSON-RPC
// ============================================================================

#[tokio::test]
async fn test_session_over_rpc_reconciles_sent_tip() {
    let (node, url) = start_node().await;
    node.lock().unwrap().logs.push(tipped_log(BOB, ME, U256::from(ONE), "earlier", 95, 0x40));

    let config = TipJarConfig::default()
        .with_contract(CONTRACT)
        .with_confirmation_poll(Duration::from_millis(10))
        .with_event_poll(Duration::from_millis(10));
    let rpc = RpcClient::new(url).expect("client").with_confirmation_poll(config.confirmation_poll);
    let wallet: Arc<dyn WalletProvider> = Arc::new(NodeWallet::new(rpc.clone()));
    let events: Arc<dyn TipEventSource> =
        Arc::new(LogEventSource::new(rpc.clone(), TipJar::new(config.contract), config.event_poll));
    let manager = SessionManager::new(config, Some(wallet), Arc::new(rpc), Some(events));

    manager.connect().await.expect("connect");
    let history = manager.transactions();
    assert_eq!(history.len(), 1, "backfill picks up the earlier tip");
    assert_eq!(history[0].message.as_deref(), Some("earlier"));

    let hash = manager.send_tip(&BOB.to_string(), "0.25", "thanks").await.expect("send");
    {
        let node = node.lock().unwrap();
        let sent = &node.sent[0];
        assert_eq!(sent["to"], json!(CONTRACT));
        assert_eq!(sent["value"], json!(format!("{:#x}", U256::from(ONE / 4))));
    }
    assert!(manager.transactions()[0].is_optimistic());

    // The chain mines it and emits the event.
    {
        let mut node = node.lock().unwrap();
        node.receipts.insert(hash, json!({"status": "0x1", "blockNumber": "0x65"}));
        let mut log = tipped_log(ME, BOB, U256::from(ONE / 4), "thanks", 101, 0);
        log.transaction_hash = Some(hash);
        node.logs.push(log);
        node.block = 101;
    }

    assert!(eventually(|| manager.transactions().iter().any(|r| r.hash == Some(hash) && !r.is_optimistic())).await);
    let history = manager.transactions();
    assert_eq!(history.len(), 2, "no duplicate for the reconciled tip");
    assert!(history.iter().all(|r| r.confirmed));

    manager.disconnect();
}
