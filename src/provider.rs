//! Voucher Provider Client
//!
//! Performs the outbound redemption call against the external voucher
//! service and classifies the raw response into a `RedeemOutcome`. The
//! classification is total: transport faults, timeouts, and malformed
//! bodies all become FAILED outcomes, never errors, so the orchestrator
//! pattern-matches instead of catching exceptions.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::types::{format_baht, TxStatus};

/// Hard timeout for the redemption call
const REDEEM_TIMEOUT: Duration = Duration::from_secs(15);

/// The provider rejects non-browser clients, so the request carries a
/// desktop Chrome fingerprint.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Classified result of one redemption attempt
#[derive(Debug, Clone)]
pub struct RedeemOutcome {
    /// SUCCESS only on HTTP 200 with the provider's SUCCESS status code
    pub status: TxStatus,
    /// Credited baht, 0.0 unless SUCCESS
    pub amount: f64,
    /// Voucher owner's display name, SUCCESS only
    pub sender: Option<String>,
    /// Human-readable outcome message
    pub message: String,
}

impl RedeemOutcome {
    /// A FAILED outcome with no credited amount
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TxStatus::Failed,
            amount: 0.0,
            sender: None,
            message: message.into(),
        }
    }
}

/// Outbound redemption interface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoucherProvider: Send + Sync {
    /// Redeem `code` for the wallet registered under `phone`
    ///
    /// Never fails; every fault is folded into a FAILED outcome.
    async fn redeem(&self, code: &str, phone: &str) -> RedeemOutcome;
}

/// HTTP client for the TrueMoney gift-voucher endpoint
#[derive(Debug, Clone)]
pub struct TrueMoneyClient {
    client: Client,
    base_url: String,
}

impl TrueMoneyClient {
    /// Create a new client against the given provider base URL
    ///
    /// The timeout and fingerprint headers are applied per request, so
    /// construction cannot fail.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Classify an HTTP status and body into an outcome
    ///
    /// SUCCESS requires both HTTP 200 and `status.code == "SUCCESS"` in the
    /// decoded body; everything else is FAILED with the best available
    /// provider message.
    fn classify(http_status: u16, body: &str) -> RedeemOutcome {
        let data: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return RedeemOutcome::failed(format!("Invalid provider response: {}", e)),
        };

        let code = data
            .pointer("/status/code")
            .and_then(Value::as_str)
            .unwrap_or_default();

        if http_status == 200 && code == "SUCCESS" {
            let amount = match data
                .pointer("/data/my_ticket/amount_baht")
                .and_then(parse_amount)
            {
                Some(a) => a,
                None => {
                    return RedeemOutcome::failed(
                        "Provider response missing ticket amount".to_string(),
                    )
                }
            };

            // A missing owner name does not void the payout: the voucher
            // was credited by the provider, so the outcome stays SUCCESS
            // with a placeholder sender. Only a missing amount is fatal,
            // since nothing can be credited without it.
            let sender = data
                .pointer("/data/owner_profile/full_name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();

            return RedeemOutcome {
                status: TxStatus::Success,
                amount,
                message: format!("ได้รับ {} บาท จาก {}", format_baht(amount), sender),
                sender: Some(sender),
            };
        }

        let message = data
            .pointer("/status/message")
            .and_then(Value::as_str)
            .unwrap_or("Redeem Failed")
            .to_string();

        RedeemOutcome::failed(message)
    }
}

/// The provider sends the amount as a number or a numeric string
fn parse_amount(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl VoucherProvider for TrueMoneyClient {
    async fn redeem(&self, code: &str, phone: &str) -> RedeemOutcome {
        if code.is_empty() {
            return RedeemOutcome::failed("Invalid voucher code");
        }

        let url = format!("{}/campaign/vouchers/{}/redeem", self.base_url, code);
        let payload = serde_json::json!({
            "mobile": phone,
            "voucher_hash": code,
        });

        tracing::debug!(target: "redeemd::provider", voucher = %code, "redeeming voucher");

        let resp = match self
            .client
            .post(&url)
            .timeout(REDEEM_TIMEOUT)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, "th-TH,th;q=0.9,en;q=0.8")
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "redeemd::provider", error = %e, "redemption call failed");
                return RedeemOutcome::failed(e.to_string());
            }
        };

        let http_status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return RedeemOutcome::failed(e.to_string()),
        };

        Self::classify(http_status, &body)
    }
}
