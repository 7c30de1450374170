//! HTTP routes for the tip session
//!
//! | Method | Path | Body / query | Response |
//! |--------|------|--------------|----------|
//! | GET | /health | | service name |
//! | GET | /session | | session snapshot |
//! | GET | /transactions | `?q=` | records, newest first |
//! | GET | /summary | | sent/received totals |
//! | GET | /link | `?amount=&message=&origin=` | shareable tip link |
//! | POST | /connect | | snapshot |
//! | POST | /disconnect | | snapshot |
//! | POST | /switch-network | | network correctness |
//! | POST | /tips | `TipRequest` | transaction hash |
//! | POST | /fee-estimate | `TipRequest` | advisory fee |

use axum::{extract::{Query, State}, http::StatusCode, response::IntoResponse, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::TipError;
use crate::link::{explorer_tx_url, TipLink};
use crate::session::{SessionManager, TipSummary};
use crate::types::{SessionSnapshot, TipRecord};
use crate::units::format_amount;

#[derive(Clone)]
pub struct AppState { pub manager: SessionManager, pub app_name: String }

impl AppState {
    pub fn new(manager: SessionManager, app_name: impl Into<String>) -> Self {
        Self { manager, app_name: app_name.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipRequest {
    pub to: String,
    pub amount: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct SearchQuery { #[serde(default)] q: String }

#[derive(Deserialize)]
struct LinkQuery {
    #[serde(default)]
    amount: String,
    #[serde(default)]
    message: String,
    #[serde(default = "default_origin")]
    origin: String,
}
fn default_origin() -> String { "http://localhost:3000".into() }

#[derive(Serialize)]
struct TransactionsResponse { transactions: Vec<TipRecord>, count: usize }

#[derive(Serialize)]
struct TipResponse { hash: String, explorer_url: Option<String> }

#[derive(Serialize)]
struct FeeResponse { fee: String, fee_wei: String }

pub fn create_router(manager: SessionManager, app_name: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(session))
        .route("/transactions", get(transactions))
        .route("/summary", get(summary))
        .route("/link", get(link))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
        .route("/switch-network", post(switch_network))
        .route("/tips", post(send_tip))
        .route("/fee-estimate", post(fee_estimate))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(manager, app_name))
}

fn status_for(e: &TipError) -> StatusCode {
    match e {
        TipError::InvalidRecipient(_) | TipError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        TipError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TipError::NotConnected | TipError::WrongNetwork { .. } => StatusCode::CONFLICT,
        TipError::UserRejected => StatusCode::FORBIDDEN,
        TipError::NoProviderAvailable => StatusCode::SERVICE_UNAVAILABLE,
        TipError::NetworkSwitchFailed(_) | TipError::SubmissionFailed(_) | TipError::ConnectionFailed(_) => StatusCode::BAD_GATEWAY,
        TipError::EstimationFailed(_) | TipError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(e: TipError) -> (StatusCode, String) { (status_for(&e), e.to_string()) }

async fn health(State(s): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": s.app_name}))
}

async fn session(State(s): State<AppState>) -> Json<SessionSnapshot> {
    Json(s.manager.snapshot())
}

async fn transactions(State(s): State<AppState>, Query(q): Query<SearchQuery>) -> Json<TransactionsResponse> {
    let transactions = s.manager.search(&q.q);
    Json(TransactionsResponse { count: transactions.len(), transactions })
}

async fn summary(State(s): State<AppState>) -> Json<TipSummary> {
    Json(s.manager.summary())
}

async fn link(State(s): State<AppState>, Query(q): Query<LinkQuery>) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let address = s.manager.session().map(|session| session.address).ok_or_else(|| reject(TipError::NotConnected))?;
    let link = TipLink::new(address).with_amount(&q.amount).map_err(reject)?.with_message(&q.message);
    Ok(Json(json!({"url": link.url(&q.origin), "link": link})))
}

async fn connect(State(s): State<AppState>) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    s.manager.connect().await.map_err(reject)?;
    Ok(Json(s.manager.snapshot()))
}

async fn disconnect(State(s): State<AppState>) -> Json<SessionSnapshot> {
    s.manager.disconnect();
    Json(s.manager.snapshot())
}

async fn switch_network(State(s): State<AppState>) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let network_correct = s.manager.switch_network().await.map_err(reject)?;
    Ok(Json(json!({"network_correct": network_correct})))
}

async fn send_tip(State(s): State<AppState>, Json(req): Json<TipRequest>) -> Result<Json<TipResponse>, (StatusCode, String)> {
    let hash = s.manager.send_tip(&req.to, &req.amount, &req.message).await.map_err(reject)?;
    let explorer_url = s.manager.config().network.explorer_url().map(|base| explorer_tx_url(base, hash));
    Ok(Json(TipResponse { hash: hash.to_string(), explorer_url }))
}

async fn fee_estimate(State(s): State<AppState>, Json(req): Json<TipRequest>) -> Json<FeeResponse> {
    let fee = s.manager.estimate_fee(&req.to, &req.amount, &req.message).await;
    Json(FeeResponse { fee: format_amount(fee), fee_wei: fee.to_string() })
}
