//! Core Ledger Types
//!
//! Types shared across the redemption pipeline: the user account keyed by
//! API key, and the append-only transaction log entry recording one
//! redemption attempt.

use serde::{Deserialize, Serialize};

/// Outcome status of a redemption attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// Provider accepted the voucher and paid out
    Success,
    /// Anything else: bad code, expired voucher, transport fault
    Failed,
}

impl Default for TxStatus {
    fn default() -> Self {
        Self::Failed
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// A registered user's redemption identity
///
/// Created by the identity collaborator on first login; the core mutates
/// only `total_earned` (credits) while the admin surface flips `is_banned`
/// and rotates `api_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Internal numeric id
    pub id: i64,
    /// Display name
    pub username: String,
    /// Opaque API key, unique and immutable between rotations
    pub api_key: String,
    /// Cumulative credited baht over all SUCCESS transactions
    pub total_earned: f64,
    /// Banned accounts reject all new redemptions
    pub is_banned: bool,
    /// Webhook callback URL for success notifications
    pub webhook_url: Option<String>,
    /// Push-message target id for success notifications
    pub push_target: Option<String>,
    /// Unix timestamp of account creation
    pub created_at: u64,
}

/// One immutable audit record of a redemption attempt
///
/// Exactly one record exists per attempt against a valid, non-banned key,
/// whatever the outcome. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Row id (0 until persisted)
    pub id: i64,
    /// Owning account id
    pub account_id: i64,
    /// Extracted voucher code as submitted to the provider
    pub voucher_code: String,
    /// Phone number the payout was addressed to
    pub phone_number: String,
    /// Credited baht, 0.0 unless status is SUCCESS
    pub amount: f64,
    /// Outcome classification
    pub status: TxStatus,
    /// Human-readable outcome message
    pub message: String,
    /// Unix timestamp of the attempt
    pub created_at: u64,
}

impl TransactionRecord {
    /// Build an unpersisted record for the given attempt
    pub fn new(
        account_id: i64,
        voucher_code: impl Into<String>,
        phone_number: impl Into<String>,
        amount: f64,
        status: TxStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            account_id,
            voucher_code: voucher_code.into(),
            phone_number: phone_number.into(),
            amount,
            status,
            message: message.into(),
            created_at: unix_now(),
        }
    }
}

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Format a baht amount the way the provider messages do
///
/// Integral amounts keep one decimal place ("50.0"), fractional amounts
/// print as-is ("12.34").
pub fn format_baht(amount: f64) -> String {
    if amount == amount.trunc() {
        format!("{:.1}", amount)
    } else {
        format!("{}", amount)
    }
}
