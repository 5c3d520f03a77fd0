//! In-Memory Ledger Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{generate_api_key, LedgerStore, StorageError, StorageResult, SuccessStats};
use crate::types::{unix_now, Account, TransactionRecord, TxStatus};

/// In-memory ledger
///
/// Thread-safe; the write lock serializes credits, matching the atomicity
/// the SQLite implementation gets from its single UPDATE.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<i64, Account>,
    /// Index: api_key -> account id
    by_key: HashMap<String, i64>,
    transactions: Vec<TransactionRecord>,
    next_account_id: i64,
    next_tx_id: i64,
}

impl MemoryLedger {
    /// Create a new empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored transactions (test helper)
    pub async fn transaction_count(&self) -> usize {
        self.inner.read().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_account(&self, username: &str) -> StorageResult<Account> {
        let mut inner = self.inner.write().await;

        inner.next_account_id += 1;
        let account = Account {
            id: inner.next_account_id,
            username: username.to_string(),
            api_key: generate_api_key(),
            total_earned: 0.0,
            is_banned: false,
            webhook_url: None,
            push_target: None,
            created_at: unix_now(),
        };

        inner.by_key.insert(account.api_key.clone(), account.id);
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account_by_api_key(&self, api_key: &str) -> StorageResult<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_key
            .get(api_key)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn get_account(&self, id: i64) -> StorageResult<Option<Account>> {
        Ok(self.inner.read().await.accounts.get(&id).cloned())
    }

    async fn credit_account(&self, id: i64, amount: f64) -> StorageResult<f64> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("account {}", id)))?;

        account.total_earned += amount;
        Ok(account.total_earned)
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> StorageResult<i64> {
        let mut inner = self.inner.write().await;

        inner.next_tx_id += 1;
        let mut stored = record.clone();
        stored.id = inner.next_tx_id;
        inner.transactions.push(stored);
        Ok(inner.next_tx_id)
    }

    async fn recent_transactions(
        &self,
        account_id: i64,
        limit: u32,
    ) -> StorageResult<Vec<TransactionRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .rev()
            .filter(|t| t.account_id == account_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn success_stats(&self, account_id: i64) -> StorageResult<SuccessStats> {
        let inner = self.inner.read().await;
        let mut stats = SuccessStats::default();

        for tx in &inner.transactions {
            if tx.account_id == account_id && tx.status == TxStatus::Success {
                stats.count += 1;
                stats.total_amount += tx.amount;
            }
        }

        Ok(stats)
    }

    async fn set_notify_targets(
        &self,
        id: i64,
        webhook_url: Option<String>,
        push_target: Option<String>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("account {}", id)))?;

        account.webhook_url = webhook_url;
        account.push_target = push_target;
        Ok(())
    }

    async fn rotate_api_key(&self, id: i64) -> StorageResult<String> {
        let mut inner = self.inner.write().await;
        let new_key = generate_api_key();

        let old_key = {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or_else(|| StorageError::NotFound(format!("account {}", id)))?;
            let old = account.api_key.clone();
            account.api_key = new_key.clone();
            old
        };

        inner.by_key.remove(&old_key);
        inner.by_key.insert(new_key.clone(), id);
        Ok(new_key)
    }

    async fn set_banned(&self, id: i64, banned: bool) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("account {}", id)))?;

        account.is_banned = banned;
        Ok(())
    }

    async fn total_redeemed(&self) -> StorageResult<f64> {
        let inner = self.inner.read().await;
        Ok(inner
            .transactions
            .iter()
            .filter(|t| t.status == TxStatus::Success)
            .map(|t| t.amount)
            .sum())
    }
}
