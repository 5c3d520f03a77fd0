//! Notification Fan-out
//!
//! Sends success notifications to a user-configured webhook URL and a
//! push-message target. The two channels are independent, each carries its
//! own short timeout, and in the redemption path every delivery failure is
//! swallowed so notifications can never fail or delay a redemption.
//!
//! The `send_test` variant is the operator-facing exception: it collects
//! per-channel results and reports them back.

use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;
use crate::types::format_baht;

/// Webhook deliveries give up quickly
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(3);
/// Push-provider calls are slightly slower
const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Notification delivery errors (surfaced only by `send_test`)
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("push channel token not configured")]
    NoPushToken,
}

/// Per-channel report from a test notification
#[derive(Debug, Default, serde::Serialize)]
pub struct NotifyTestReport {
    /// Channels that accepted the message
    pub triggered: Vec<String>,
    /// Per-channel error descriptions
    pub errors: Vec<String>,
}

impl NotifyTestReport {
    /// True when at least one channel accepted the message
    pub fn any_sent(&self) -> bool {
        !self.triggered.is_empty()
    }

    /// One-line operator summary
    pub fn summary(&self) -> String {
        match (self.triggered.is_empty(), self.errors.is_empty()) {
            (false, true) => format!("Sent: {}", self.triggered.join(", ")),
            (false, false) => format!(
                "Sent: {} | Problems: {}",
                self.triggered.join(", "),
                self.errors.join("; ")
            ),
            (true, false) => self.errors.join("; "),
            (true, true) => "No notification targets configured".to_string(),
        }
    }
}

/// Dispatcher for both outbound notification channels
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    client: Client,
    push_url: String,
    push_token: Option<String>,
}

impl NotificationDispatcher {
    /// Create a dispatcher from application configuration
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            push_url: config.push_url.trim_end_matches('/').to_string(),
            push_token: config.push_token.clone(),
        }
    }

    /// Fire both channels concurrently, ignoring their results
    ///
    /// Failure or slowness of one channel never affects the other; both
    /// are bounded by their own timeouts.
    pub async fn dispatch(
        &self,
        webhook_url: Option<&str>,
        push_target: Option<&str>,
        amount: f64,
        phone: &str,
        sender: &str,
        new_total: f64,
    ) {
        let webhook = async {
            if let Some(url) = webhook_url.filter(|u| !u.is_empty()) {
                if let Err(e) = self.post_webhook(url, amount, phone, sender, new_total).await {
                    tracing::debug!(target: "redeemd::notify", error = %e, "webhook delivery failed");
                }
            }
        };

        let push = async {
            if let Some(target) = push_target.filter(|t| !t.is_empty()) {
                if let Err(e) = self.post_push(target, amount, phone, sender).await {
                    tracing::debug!(target: "redeemd::notify", error = %e, "push delivery failed");
                }
            }
        };

        tokio::join!(webhook, push);
    }

    /// Synchronous test variant: errors are collected, not swallowed
    pub async fn send_test(
        &self,
        webhook_url: Option<&str>,
        push_target: Option<&str>,
    ) -> NotifyTestReport {
        let mut report = NotifyTestReport::default();

        if let Some(url) = webhook_url.filter(|u| !u.is_empty()) {
            match self.post_test_webhook(url).await {
                Ok(()) => report.triggered.push("webhook".to_string()),
                Err(e) => report.errors.push(format!("webhook: {}", e)),
            }
        }

        if let Some(target) = push_target.filter(|t| !t.is_empty()) {
            match self
                .post_push_text(target, "🔔 Test: push notifications are working!")
                .await
            {
                Ok(()) => report.triggered.push("push".to_string()),
                Err(e) => report.errors.push(format!("push: {}", e)),
            }
        }

        report
    }

    /// Answer a push-provider chat event, telling the sender their target id
    pub async fn reply_push(&self, reply_token: &str, text: &str) -> Result<(), NotifyError> {
        let token = self.push_token.as_deref().ok_or(NotifyError::NoPushToken)?;

        let payload = json!({
            "replyToken": reply_token,
            "messages": [{"type": "text", "text": text}],
        });

        let resp = self
            .client
            .post(format!("{}/v2/bot/message/reply", self.push_url))
            .bearer_auth(token)
            .json(&payload)
            .timeout(PUSH_TIMEOUT)
            .send()
            .await?;

        check_status(resp).await
    }

    /// Build the webhook embed payload for a credited redemption
    fn webhook_payload(amount: f64, phone: &str, sender: &str, new_total: f64) -> serde_json::Value {
        json!({
            "embeds": [{
                "title": "💰 เงินเข้าจ้า!! (Money In)",
                "color": 5763719,
                "fields": [
                    {"name": "💵 จำนวน", "value": format!("`{} THB`", format_baht(amount)), "inline": true},
                    {"name": "📱 เบอร์", "value": format!("`{}`", phone), "inline": true},
                    {"name": "👤 ผู้ส่ง", "value": format!("`{}`", sender), "inline": true},
                    {"name": "🏦 ยอดสะสม", "value": format!("`{} THB`", format_baht(new_total)), "inline": false}
                ],
                "footer": {"text": "Voucher Redeem System"},
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }]
        })
    }

    async fn post_webhook(
        &self,
        url: &str,
        amount: f64,
        phone: &str,
        sender: &str,
        new_total: f64,
    ) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(url)
            .json(&Self::webhook_payload(amount, phone, sender, new_total))
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?;

        check_status(resp).await
    }

    async fn post_test_webhook(&self, url: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "embeds": [{"title": "🔔 Test Webhook", "description": "OK!", "color": 5763719}]
        });

        let resp = self
            .client
            .post(url)
            .json(&payload)
            .timeout(WEBHOOK_TIMEOUT)
            .send()
            .await?;

        check_status(resp).await
    }

    async fn post_push(
        &self,
        target: &str,
        amount: f64,
        phone: &str,
        sender: &str,
    ) -> Result<(), NotifyError> {
        let text = format!(
            "💰 เงินเข้า: {} บาท\n📱 เบอร์: {}\n👤 จาก: {}",
            format_baht(amount),
            phone,
            sender
        );
        self.post_push_text(target, &text).await
    }

    async fn post_push_text(&self, target: &str, text: &str) -> Result<(), NotifyError> {
        let token = self.push_token.as_deref().ok_or(NotifyError::NoPushToken)?;

        let payload = json!({
            "to": target,
            "messages": [{"type": "text", "text": text}],
        });

        let resp = self
            .client
            .post(format!("{}/v2/bot/message/push", self.push_url))
            .bearer_auth(token)
            .json(&payload)
            .timeout(PUSH_TIMEOUT)
            .send()
            .await?;

        check_status(resp).await
    }
}

/// Fold a non-2xx response into an error carrying the provider's detail
async fn check_status(resp: reqwest::Response) -> Result<(), NotifyError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or(body);

    Err(NotifyError::Status(status.as_u16(), detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(push_token: Option<&str>) -> NotificationDispatcher {
        let mut config = AppConfig::for_tests();
        config.push_token = push_token.map(String::from);
        NotificationDispatcher::new(&config)
    }

    #[tokio::test]
    async fn test_dispatch_without_targets_is_noop() {
        let d = dispatcher(None);
        // Completes immediately, no network calls to make
        d.dispatch(None, None, 50.0, "0812345678", "Alice", 150.0)
            .await;
        d.dispatch(Some(""), Some(""), 50.0, "0812345678", "Alice", 150.0)
            .await;
    }

    #[tokio::test]
    async fn test_push_without_token_is_reported_in_test_mode() {
        let d = dispatcher(None);
        let report = d.send_test(None, Some("U1234")).await;

        assert!(!report.any_sent());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("token not configured"));
    }

    #[tokio::test]
    async fn test_empty_targets_yield_empty_report() {
        let d = dispatcher(Some("token"));
        let report = d.send_test(None, None).await;

        assert!(report.triggered.is_empty());
        assert!(report.errors.is_empty());
        assert_eq!(report.summary(), "No notification targets configured");
    }

    #[test]
    fn test_report_summary_mixes_results() {
        let report = NotifyTestReport {
            triggered: vec!["webhook".to_string()],
            errors: vec!["push: HTTP 401: invalid token".to_string()],
        };
        let summary = report.summary();
        assert!(summary.contains("Sent: webhook"));
        assert!(summary.contains("Problems"));
    }

    #[test]
    fn test_webhook_payload_fields() {
        let payload = NotificationDispatcher::webhook_payload(50.0, "0812345678", "Alice", 150.0);
        let fields = payload["embeds"][0]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0]["value"], "`50.0 THB`");
        assert_eq!(fields[3]["value"], "`150.0 THB`");
    }
}
