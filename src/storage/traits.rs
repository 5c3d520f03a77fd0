//! Storage Trait Definitions
//!
//! Defines the abstract ledger interface owning accounts and the
//! append-only transaction log. Implementations can use SQLite
//! (production) or in-memory (testing).

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Account, TransactionRecord};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Aggregate of an account's successful redemptions
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct SuccessStats {
    /// Number of SUCCESS transactions
    pub count: u64,
    /// Sum of credited baht
    pub total_amount: f64,
}

/// Ledger storage interface
///
/// Implementations:
/// - `SqliteLedger` - Production storage with SQLite
/// - `MemoryLedger` - In-memory storage for testing
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create an account with a freshly generated API key
    async fn create_account(&self, username: &str) -> StorageResult<Account>;

    /// Look up an account by API key
    async fn get_account_by_api_key(&self, api_key: &str) -> StorageResult<Option<Account>>;

    /// Look up an account by id
    async fn get_account(&self, id: i64) -> StorageResult<Option<Account>>;

    /// Atomically add `amount` to the account's total and return the new total
    ///
    /// The increment happens inside the store so concurrent redemptions on
    /// the same account cannot race past each other.
    async fn credit_account(&self, id: i64, amount: f64) -> StorageResult<f64>;

    /// Append a transaction record, returning its row id
    ///
    /// This is the audit trail; a failure here is fatal to the request.
    async fn append_transaction(&self, record: &TransactionRecord) -> StorageResult<i64>;

    /// Latest transactions for an account, newest first
    async fn recent_transactions(
        &self,
        account_id: i64,
        limit: u32,
    ) -> StorageResult<Vec<TransactionRecord>>;

    /// Count and sum of the account's SUCCESS transactions
    async fn success_stats(&self, account_id: i64) -> StorageResult<SuccessStats>;

    /// Set or clear the notification targets
    async fn set_notify_targets(
        &self,
        id: i64,
        webhook_url: Option<String>,
        push_target: Option<String>,
    ) -> StorageResult<()>;

    /// Replace the account's API key, returning the new one
    async fn rotate_api_key(&self, id: i64) -> StorageResult<String>;

    /// Set or clear the ban flag
    async fn set_banned(&self, id: i64, banned: bool) -> StorageResult<()>;

    /// Sum of SUCCESS amounts across all accounts
    async fn total_redeemed(&self) -> StorageResult<f64>;
}

/// Generate a fresh opaque API key (32 hex chars)
pub fn generate_api_key() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
