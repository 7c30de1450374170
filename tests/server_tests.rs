//! HTTP API over a mock-backed session.
//!
//! Run with: cargo test --test server_tests

use alloy_primitives::{address, Address, U256};
use serde_json::{json, Value};
use std::sync::Arc;
use tipjar::mock::MockWallet;
use tipjar::{create_router, ChainClient, SessionManager, TipEventSource, TipJarConfig, WalletProvider};

const ME: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1");

struct TestServer {
    base: String,
    mock: Arc<MockWallet>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let mock = Arc::new(
            MockWallet::new()
                .with_account(ME)
                .with_balance(U256::from(10u64) * U256::from(1_000_000_000_000_000_000u128))
                .with_block(500),
        );
        let wallet: Arc<dyn WalletProvider> = mock.clone();
        let chain: Arc<dyn ChainClient> = mock.clone();
        let events: Arc<dyn TipEventSource> = mock.clone();
        let manager = SessionManager::new(TipJarConfig::default(), Some(wallet), chain, Some(events));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, create_router(manager, "tipjar-test")).await;
        });

        Self { base: format!("http://{}", addr), mock, client: reqwest::Client::new() }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let res = self.client.get(format!("{}{}", self.base, path)).send().await.expect("request");
        let status = res.status().as_u16();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, String) {
        let res = self.client.post(format!("{}{}", self.base, path)).json(&body).send().await.expect("request");
        let status = res.status().as_u16();
        (status, res.text().await.unwrap_or_default())
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "tipjar-test");
}

#[tokio::test]
async fn test_connect_then_session_snapshot() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/session").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "disconnected");

    let (status, _) = server.post("/connect", json!({})).await;
    assert_eq!(status, 200);

    let (_, body) = server.get("/session").await;
    assert_eq!(body["status"], "connected");
    assert_eq!(body["network_correct"], true);
    assert_eq!(body["balance"], "10.0");
    assert_eq!(server.mock.queries(), vec![400]);
}

#[tokio::test]
async fn test_tip_validation_maps_to_client_errors() {
    let server = TestServer::start().await;

    let tip = json!({"to": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2", "amount": "1", "message": "hi"});
    let (status, _) = server.post("/tips", tip.clone()).await;
    assert_eq!(status, 409, "not connected");

    server.post("/connect", json!({})).await;
    let (status, body) = server.post("/tips", json!({"to": "0x12", "amount": "1"})).await;
    assert_eq!(status, 400);
    assert!(body.contains("invalid recipient"));

    let (status, _) = server.post("/tips", json!({"to": tip["to"], "amount": "0"})).await;
    assert_eq!(status, 400);
    assert_eq!(server.mock.calls("send_transaction"), 0);
}

#[tokio::test]
async fn test_send_tip_and_list_transactions() {
    let server = TestServer::start().await;
    server.post("/connect", json!({})).await;

    let tip = json!({"to": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2", "amount": "1.5", "message": "thanks"});
    let (status, body) = server.post("/tips", tip).await;
    assert_eq!(status, 200, "{}", body);
    let body: Value = serde_json::from_str(&body).expect("json");
    let hash = body["hash"].as_str().expect("hash").to_string();
    assert!(body["explorer_url"].as_str().unwrap().ends_with(&format!("/tx/{}", hash)));

    let (_, list) = server.get("/transactions").await;
    assert_eq!(list["count"], 1);
    assert_eq!(list["transactions"][0]["amount"], "1.5");
    assert_eq!(list["transactions"][0]["direction"], "sent");

    let (_, list) = server.get("/transactions?q=nothing-matches").await;
    assert_eq!(list["count"], 0);

    let (_, summary) = server.get("/summary").await;
    assert_eq!(summary["sent_count"], 1);
    assert_eq!(summary["total_sent"], "1.5");
}

#[tokio::test]
async fn test_fee_estimate_falls_back() {
    let server = TestServer::start().await;
    let (status, body) = server.post("/fee-estimate", json!({"to": "garbage", "amount": "x"})).await;
    assert_eq!(status, 200);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["fee"], "0.0001");
}

#[tokio::test]
async fn test_link_and_disconnect() {
    let server = TestServer::start().await;

    let (status, _) = server.get("/link").await;
    assert_eq!(status, 409);

    server.post("/connect", json!({})).await;
    let (status, body) = server.get("/link?amount=2&message=gm&origin=https://tips.example").await;
    assert_eq!(status, 200);
    assert_eq!(body["url"], format!("https://tips.example/tip/{}?amount=2&message=gm", ME));

    let (status, _) = server.post("/disconnect", json!({})).await;
    assert_eq!(status, 200);
    let (_, body) = server.get("/session").await;
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["transactions"], json!([]));
}
