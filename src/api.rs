//! REST API
//!
//! Inbound HTTP surface for the redemption pipeline plus the JSON glue the
//! identity/admin collaborators drive:
//!
//! - GET  /:api_key/redeem            - Redeem a voucher link
//! - GET  /api/health                 - Health check
//! - POST /api/accounts               - Create an account (admin)
//! - GET  /api/accounts/:id           - Account details + stats (admin)
//! - GET  /api/accounts/:id/transactions - Latest transactions (admin)
//! - POST /api/accounts/:id/notify    - Set notification targets (admin)
//! - POST /api/accounts/:id/rotate-key - Issue a fresh API key (admin)
//! - POST /api/accounts/:id/ban       - Set the ban flag (admin)
//! - POST /api/notify/test            - Test-notification report (admin)
//! - POST /push/events                - Push-provider event webhook
//! - GET  /api/stats                  - System-wide redeemed total (admin)
//!
//! Business failures on the redeem endpoint still return HTTP 200 with a
//! FAILED status; only authentication (401), bans (403), and storage
//! faults (500) use error status codes.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::service::{RedeemError, RedemptionService};
use crate::storage::SuccessStats;
use crate::types::Account;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RedeemParams {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyTargetsRequest {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub push_target: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub banned: bool,
}

#[derive(Debug, Deserialize)]
pub struct TestNotifyRequest {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub push_target: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub account: Account,
    pub stats: SuccessStats,
}

#[derive(Debug, Serialize)]
pub struct RotateKeyResponse {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_redeemed: f64,
}

/// Push-provider event envelope (only message events matter here)
#[derive(Debug, Deserialize)]
pub struct PushEventBody {
    #[serde(default)]
    pub events: Vec<PushEvent>,
}

#[derive(Debug, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(rename = "replyToken", default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<PushEventSource>,
}

#[derive(Debug, Deserialize)]
pub struct PushEventSource {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

// =============================================================================
// Application State
// =============================================================================

/// Shared state for all handlers
pub struct ApiState {
    pub service: RedemptionService,
    /// Bearer token guarding the admin endpoints; absent means locked
    pub admin_token: Option<String>,
}

pub type SharedApiState = Arc<ApiState>;

/// Check the Authorization header against the configured admin token
///
/// With no token configured the admin surface rejects everything.
fn require_admin(state: &ApiState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = match state.admin_token.as_deref() {
        Some(token) => token,
        None => return Err(forbidden("Admin access not configured")),
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(forbidden("Unauthorized")),
    }
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(ErrorResponse::new(message))).into_response()
}

fn storage_fault() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal storage error")),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(format!("{} not found", what))),
    )
        .into_response()
}

// =============================================================================
// API Handlers
// =============================================================================

/// GET /:api_key/redeem?link=&phone=
///
/// Runs one redemption attempt. The JSON body always carries
/// `{status, amount, message}`; business failures are data, not errors.
async fn handle_redeem(
    State(state): State<SharedApiState>,
    Path(api_key): Path<String>,
    Query(params): Query<RedeemParams>,
) -> Response {
    match state
        .service
        .redeem(&api_key, &params.link, &params.phone)
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(RedeemError::InvalidKey) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("API Key Invalid")),
        )
            .into_response(),
        Err(RedeemError::Banned) => {
            (StatusCode::FORBIDDEN, Json(ErrorResponse::new("BANNED"))).into_response()
        }
        Err(RedeemError::Storage(e)) => {
            tracing::error!(target: "redeemd::api", error = %e, "storage fault during redemption");
            storage_fault()
        }
    }
}

/// GET /api/health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /api/accounts
async fn handle_create_account(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Json(req): Json<CreateAccountRequest>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    match state.service.ledger().create_account(&req.username).await {
        Ok(account) => (StatusCode::CREATED, Json(account)).into_response(),
        Err(e) => {
            tracing::error!(target: "redeemd::api", error = %e, "account creation failed");
            storage_fault()
        }
    }
}

/// GET /api/accounts/:id
async fn handle_get_account(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    let ledger = state.service.ledger();
    let account = match ledger.get_account(id).await {
        Ok(Some(account)) => account,
        Ok(None) => return not_found("Account"),
        Err(_) => return storage_fault(),
    };

    let stats = match ledger.success_stats(id).await {
        Ok(stats) => stats,
        Err(_) => return storage_fault(),
    };

    (StatusCode::OK, Json(AccountResponse { account, stats })).into_response()
}

/// GET /api/accounts/:id/transactions
async fn handle_list_transactions(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    match state.service.ledger().recent_transactions(id, 20).await {
        Ok(txs) => (StatusCode::OK, Json(txs)).into_response(),
        Err(_) => storage_fault(),
    }
}

/// POST /api/accounts/:id/notify
async fn handle_set_notify_targets(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<NotifyTargetsRequest>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    let webhook_url = req.webhook_url.filter(|s| !s.trim().is_empty());
    let push_target = req.push_target.filter(|s| !s.trim().is_empty());

    match state
        .service
        .ledger()
        .set_notify_targets(id, webhook_url, push_target)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(crate::storage::StorageError::NotFound(_)) => not_found("Account"),
        Err(_) => storage_fault(),
    }
}

/// POST /api/accounts/:id/rotate-key
async fn handle_rotate_key(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    match state.service.ledger().rotate_api_key(id).await {
        Ok(api_key) => (StatusCode::OK, Json(RotateKeyResponse { api_key })).into_response(),
        Err(crate::storage::StorageError::NotFound(_)) => not_found("Account"),
        Err(_) => storage_fault(),
    }
}

/// POST /api/accounts/:id/ban
async fn handle_set_ban(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<BanRequest>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    match state.service.ledger().set_banned(id, req.banned).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(crate::storage::StorageError::NotFound(_)) => not_found("Account"),
        Err(_) => storage_fault(),
    }
}

/// POST /api/notify/test
///
/// Sends a test message to both channels and reports per-channel results
/// instead of swallowing them.
async fn handle_test_notify(
    State(state): State<SharedApiState>,
    headers: HeaderMap,
    Json(req): Json<TestNotifyRequest>,
) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    let report = state
        .service
        .notifier()
        .send_test(req.webhook_url.as_deref(), req.push_target.as_deref())
        .await;

    let status = if report.any_sent() { "success" } else { "error" };
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": status,
            "message": report.summary(),
            "report": report,
        })),
    )
        .into_response()
}

/// POST /push/events
///
/// Push-provider event webhook. Message events are answered with the
/// sender's target id so users can configure their push channel.
async fn handle_push_events(
    State(state): State<SharedApiState>,
    Json(body): Json<PushEventBody>,
) -> Response {
    for event in body.events {
        if event.event_type != "message" {
            continue;
        }

        let (reply_token, user_id) = match (
            event.reply_token,
            event.source.and_then(|s| s.user_id),
        ) {
            (Some(token), Some(id)) => (token, id),
            _ => continue,
        };

        let text = format!("🆔 Your push target id:\n{}", user_id);
        if let Err(e) = state.service.notifier().reply_push(&reply_token, &text).await {
            tracing::warn!(target: "redeemd::api", error = %e, "push reply failed");
        }
    }

    (StatusCode::OK, "OK").into_response()
}

/// GET /api/stats
async fn handle_stats(State(state): State<SharedApiState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }

    match state.service.ledger().total_redeemed().await {
        Ok(total_redeemed) => {
            (StatusCode::OK, Json(StatsResponse { total_redeemed })).into_response()
        }
        Err(_) => storage_fault(),
    }
}

// =============================================================================
// Router
// =============================================================================

/// Create the application router
pub fn create_router(service: RedemptionService, admin_token: Option<String>) -> Router {
    let state = Arc::new(ApiState {
        service,
        admin_token,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/accounts", post(handle_create_account))
        .route("/api/accounts/:id", get(handle_get_account))
        .route("/api/accounts/:id/transactions", get(handle_list_transactions))
        .route("/api/accounts/:id/notify", post(handle_set_notify_targets))
        .route("/api/accounts/:id/rotate-key", post(handle_rotate_key))
        .route("/api/accounts/:id/ban", post(handle_set_ban))
        .route("/api/notify/test", post(handle_test_notify))
        .route("/api/stats", get(handle_stats))
        .route("/push/events", post(handle_push_events))
        .route("/:api_key/redeem", get(handle_redeem))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the given address
pub async fn serve(router: Router, bind_addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(target: "redeemd::api", addr = %bind_addr, "listening");
    axum::serve(listener, router).await
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::notify::NotificationDispatcher;
    use crate::provider::{MockVoucherProvider, RedeemOutcome};
    use crate::storage::{LedgerStore, MemoryLedger};
    use crate::types::TxStatus;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router(
        ledger: MemoryLedger,
        provider: MockVoucherProvider,
        admin_token: Option<&str>,
    ) -> Router {
        let service = RedemptionService::new(
            Arc::new(ledger),
            Arc::new(provider),
            NotificationDispatcher::new(&AppConfig::for_tests()),
        );
        create_router(service, admin_token.map(String::from))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_router(MemoryLedger::new(), MockVoucherProvider::new(), None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_redeem_unknown_key_is_401() {
        let ledger = MemoryLedger::new();
        let app = test_router(ledger.clone(), MockVoucherProvider::new(), None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/deadbeef/redeem?link=v%3DABC&phone=0812345678")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "API Key Invalid");
        assert_eq!(ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_redeem_banned_is_403() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("mallory").await.unwrap();
        ledger.set_banned(account.id, true).await.unwrap();

        let app = test_router(ledger.clone(), MockVoucherProvider::new(), None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{}/redeem?link=v%3DABC&phone=0", account.api_key))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["message"], "BANNED");
        assert_eq!(ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_redeem_success_body() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("alice").await.unwrap();
        ledger.credit_account(account.id, 100.0).await.unwrap();

        let mut provider = MockVoucherProvider::new();
        provider.expect_redeem().returning(|_, _| RedeemOutcome {
            status: TxStatus::Success,
            amount: 50.0,
            sender: Some("Alice".to_string()),
            message: "ได้รับ 50.0 บาท จาก Alice".to_string(),
        });

        let app = test_router(ledger.clone(), provider, None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!(
                        "/{}/redeem?link=v%3DABC123&phone=0812345678",
                        account.api_key
                    ))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "SUCCESS");
        assert_eq!(body["amount"], 50.0);
        assert_eq!(body["message"], "ได้รับ 50.0 บาท จาก Alice");

        let reloaded = ledger.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_earned, 150.0);
    }

    #[tokio::test]
    async fn test_redeem_business_failure_is_200() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("bob").await.unwrap();

        let mut provider = MockVoucherProvider::new();
        provider
            .expect_redeem()
            .returning(|_, _| RedeemOutcome::failed("Voucher expired"));

        let app = test_router(ledger.clone(), provider, None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{}/redeem?link=xyz!!!&phone=0", account.api_key))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "FAILED");
        assert_eq!(body["amount"], 0.0);
        assert_eq!(ledger.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_admin_endpoints_reject_without_token() {
        let app = test_router(
            MemoryLedger::new(),
            MockVoucherProvider::new(),
            Some("secret"),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/accounts")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username": "alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_locked_when_no_token_configured() {
        let app = test_router(MemoryLedger::new(), MockVoucherProvider::new(), None);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats")
                    .header("authorization", "Bearer anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_create_account_and_stats() {
        let app = test_router(
            MemoryLedger::new(),
            MockVoucherProvider::new(),
            Some("secret"),
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/accounts")
                    .header("authorization", "Bearer secret")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username": "alice"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["api_key"].as_str().unwrap().len(), 32);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_redeemed"], 0.0);
    }

    #[tokio::test]
    async fn test_rotate_key_returns_new_key() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("carol").await.unwrap();

        let app = test_router(ledger.clone(), MockVoucherProvider::new(), Some("secret"));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/accounts/{}/rotate-key", account.id))
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let new_key = body["api_key"].as_str().unwrap();
        assert_ne!(new_key, account.api_key);
        assert!(ledger
            .get_account_by_api_key(new_key)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_push_events_ignores_non_message() {
        let app = test_router(MemoryLedger::new(), MockVoucherProvider::new(), None);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/push/events")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"events": [{"type": "follow"}]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
