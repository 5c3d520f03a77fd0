//! Redemption Service
//!
//! Orchestrates one redemption attempt end to end: account lookup, voucher
//! extraction, the external redemption call, the atomic balance credit,
//! notification fan-out, and the guaranteed audit append.
//!
//! The service holds no per-request state; every call is independent and
//! may run concurrently with others. Cross-request credit safety comes
//! from the store-level atomic increment.

use std::sync::Arc;
use thiserror::Error;

use crate::notify::NotificationDispatcher;
use crate::provider::VoucherProvider;
use crate::storage::{LedgerStore, StorageError};
use crate::types::{TransactionRecord, TxStatus};
use crate::voucher;

/// Errors surfaced to the caller before any redemption attempt is made
///
/// Auth failures log no transaction; storage faults are fatal to the
/// request.
#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("API Key Invalid")]
    InvalidKey,

    #[error("BANNED")]
    Banned,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Business result of one redemption attempt
#[derive(Debug, Clone, serde::Serialize)]
pub struct RedeemSummary {
    pub status: TxStatus,
    pub amount: f64,
    pub message: String,
}

/// The core redemption pipeline
pub struct RedemptionService {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<dyn VoucherProvider>,
    notifier: NotificationDispatcher,
}

impl RedemptionService {
    /// Assemble the pipeline from its collaborators
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        provider: Arc<dyn VoucherProvider>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            ledger,
            provider,
            notifier,
        }
    }

    /// Access the ledger (for the CRUD glue endpoints)
    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    /// Access the dispatcher (for the test-notification endpoint)
    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Run one redemption attempt
    ///
    /// Exactly one transaction is appended for every attempt that passes
    /// authentication, whatever the outcome. A storage fault while crediting
    /// still logs the attempt as FAILED before the fault is surfaced.
    pub async fn redeem(
        &self,
        api_key: &str,
        link: &str,
        phone: &str,
    ) -> Result<RedeemSummary, RedeemError> {
        let account = self
            .ledger
            .get_account_by_api_key(api_key)
            .await?
            .ok_or(RedeemError::InvalidKey)?;

        if account.is_banned {
            tracing::warn!(
                target: "redeemd::service",
                account = account.id,
                "banned account attempted redemption"
            );
            return Err(RedeemError::Banned);
        }

        let code = voucher::extract(link);
        let outcome = self.provider.redeem(&code, phone).await;

        if outcome.status == TxStatus::Success {
            let new_total = match self.ledger.credit_account(account.id, outcome.amount).await {
                Ok(total) => total,
                Err(e) => {
                    // The audit record must survive even a credit fault
                    let record = TransactionRecord::new(
                        account.id,
                        &code,
                        phone,
                        0.0,
                        TxStatus::Failed,
                        format!("Credit failed: {}", e),
                    );
                    if let Err(log_err) = self.ledger.append_transaction(&record).await {
                        tracing::error!(
                            target: "redeemd::service",
                            account = account.id,
                            error = %log_err,
                            "failed to log credit fault"
                        );
                    }
                    return Err(e.into());
                }
            };

            tracing::info!(
                target: "redeemd::service",
                account = account.id,
                amount = outcome.amount,
                total = new_total,
                "voucher redeemed"
            );

            let sender = outcome.sender.as_deref().unwrap_or("Unknown");
            self.notifier
                .dispatch(
                    account.webhook_url.as_deref(),
                    account.push_target.as_deref(),
                    outcome.amount,
                    phone,
                    sender,
                    new_total,
                )
                .await;
        } else {
            tracing::info!(
                target: "redeemd::service",
                account = account.id,
                voucher = %code,
                message = %outcome.message,
                "redemption failed"
            );
        }

        let record = TransactionRecord::new(
            account.id,
            &code,
            phone,
            outcome.amount,
            outcome.status,
            &outcome.message,
        );
        self.ledger.append_transaction(&record).await?;

        Ok(RedeemSummary {
            status: outcome.status,
            amount: outcome.amount,
            message: outcome.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::provider::{MockVoucherProvider, RedeemOutcome};
    use crate::storage::MemoryLedger;
    use crate::types::format_baht;

    fn success_outcome(amount: f64, sender: &str) -> RedeemOutcome {
        RedeemOutcome {
            status: TxStatus::Success,
            amount,
            sender: Some(sender.to_string()),
            message: format!("ได้รับ {} บาท จาก {}", format_baht(amount), sender),
        }
    }

    fn service(ledger: MemoryLedger, provider: MockVoucherProvider) -> RedemptionService {
        RedemptionService::new(
            Arc::new(ledger),
            Arc::new(provider),
            NotificationDispatcher::new(&AppConfig::for_tests()),
        )
    }

    #[tokio::test]
    async fn test_success_credits_and_logs_once() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("alice").await.unwrap();
        ledger.credit_account(account.id, 100.0).await.unwrap();

        let mut provider = MockVoucherProvider::new();
        provider
            .expect_redeem()
            .withf(|code, phone| code == "ABC123" && phone == "0812345678")
            .returning(|_, _| success_outcome(50.0, "Alice"));

        let svc = service(ledger.clone(), provider);
        let summary = svc
            .redeem(&account.api_key, "https://gift.example/?v=ABC123", "0812345678")
            .await
            .unwrap();

        assert_eq!(summary.status, TxStatus::Success);
        assert_eq!(summary.amount, 50.0);
        assert_eq!(summary.message, "ได้รับ 50.0 บาท จาก Alice");

        let reloaded = ledger.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_earned, 150.0);

        let txs = ledger.recent_transactions(account.id, 20).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TxStatus::Success);
        assert_eq!(txs[0].amount, 50.0);
        assert_eq!(txs[0].voucher_code, "ABC123");
    }

    #[tokio::test]
    async fn test_failure_leaves_total_and_logs_zero_amount() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("bob").await.unwrap();

        let mut provider = MockVoucherProvider::new();
        provider
            .expect_redeem()
            .withf(|code, _| code == "xyz")
            .returning(|_, _| RedeemOutcome::failed("Voucher expired"));

        let svc = service(ledger.clone(), provider);
        let summary = svc
            .redeem(&account.api_key, "xyz!!!", "0812345678")
            .await
            .unwrap();

        assert_eq!(summary.status, TxStatus::Failed);
        assert_eq!(summary.amount, 0.0);
        assert_eq!(summary.message, "Voucher expired");

        let reloaded = ledger.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_earned, 0.0);

        let txs = ledger.recent_transactions(account.id, 20).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TxStatus::Failed);
        assert_eq!(txs[0].amount, 0.0);
    }

    /// Ledger that accepts everything except credits
    #[derive(Clone)]
    struct FailingCreditLedger(MemoryLedger);

    #[async_trait::async_trait]
    impl LedgerStore for FailingCreditLedger {
        async fn create_account(&self, username: &str) -> crate::storage::StorageResult<crate::types::Account> {
            self.0.create_account(username).await
        }

        async fn get_account_by_api_key(
            &self,
            api_key: &str,
        ) -> crate::storage::StorageResult<Option<crate::types::Account>> {
            self.0.get_account_by_api_key(api_key).await
        }

        async fn get_account(
            &self,
            id: i64,
        ) -> crate::storage::StorageResult<Option<crate::types::Account>> {
            self.0.get_account(id).await
        }

        async fn credit_account(&self, _id: i64, _amount: f64) -> crate::storage::StorageResult<f64> {
            Err(StorageError::Database("disk I/O error".to_string()))
        }

        async fn append_transaction(
            &self,
            record: &TransactionRecord,
        ) -> crate::storage::StorageResult<i64> {
            self.0.append_transaction(record).await
        }

        async fn recent_transactions(
            &self,
            account_id: i64,
            limit: u32,
        ) -> crate::storage::StorageResult<Vec<TransactionRecord>> {
            self.0.recent_transactions(account_id, limit).await
        }

        async fn success_stats(
            &self,
            account_id: i64,
        ) -> crate::storage::StorageResult<crate::storage::SuccessStats> {
            self.0.success_stats(account_id).await
        }

        async fn set_notify_targets(
            &self,
            id: i64,
            webhook_url: Option<String>,
            push_target: Option<String>,
        ) -> crate::storage::StorageResult<()> {
            self.0.set_notify_targets(id, webhook_url, push_target).await
        }

        async fn rotate_api_key(&self, id: i64) -> crate::storage::StorageResult<String> {
            self.0.rotate_api_key(id).await
        }

        async fn set_banned(&self, id: i64, banned: bool) -> crate::storage::StorageResult<()> {
            self.0.set_banned(id, banned).await
        }

        async fn total_redeemed(&self) -> crate::storage::StorageResult<f64> {
            self.0.total_redeemed().await
        }
    }

    #[tokio::test]
    async fn test_credit_fault_still_logs_failed_row() {
        let inner = MemoryLedger::new();
        let account = inner.create_account("grace").await.unwrap();
        let ledger = FailingCreditLedger(inner.clone());

        let mut provider = MockVoucherProvider::new();
        provider
            .expect_redeem()
            .returning(|_, _| success_outcome(50.0, "Alice"));

        let svc = RedemptionService::new(
            Arc::new(ledger),
            Arc::new(provider),
            NotificationDispatcher::new(&AppConfig::for_tests()),
        );

        let result = svc
            .redeem(&account.api_key, "v=ABC123", "0812345678")
            .await;
        assert!(matches!(result, Err(RedeemError::Storage(_))));

        // The audit row survives the fault: exactly one FAILED, amount 0
        let txs = inner.recent_transactions(account.id, 20).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TxStatus::Failed);
        assert_eq!(txs[0].amount, 0.0);
        assert!(txs[0].message.contains("Credit failed"));

        // And the balance was never touched
        let reloaded = inner.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_earned, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_key_logs_nothing() {
        let ledger = MemoryLedger::new();
        let provider = MockVoucherProvider::new();

        let svc = service(ledger.clone(), provider);
        let result = svc.redeem("deadbeef", "v=ABC", "0812345678").await;

        assert!(matches!(result, Err(RedeemError::InvalidKey)));
        assert_eq!(ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_banned_account_logs_nothing() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("mallory").await.unwrap();
        ledger.set_banned(account.id, true).await.unwrap();

        let provider = MockVoucherProvider::new();
        let svc = service(ledger.clone(), provider);
        let result = svc.redeem(&account.api_key, "v=ABC", "0812345678").await;

        assert!(matches!(result, Err(RedeemError::Banned)));
        assert_eq!(ledger.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_does_not_change_outcome() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("carol").await.unwrap();
        ledger
            .set_notify_targets(
                account.id,
                Some("http://127.0.0.1:1/hook".to_string()),
                None,
            )
            .await
            .unwrap();

        let mut provider = MockVoucherProvider::new();
        provider
            .expect_redeem()
            .returning(|_, _| success_outcome(25.0, "Dave"));

        let svc = service(ledger.clone(), provider);
        let summary = svc
            .redeem(&account.api_key, "v=GOOD1", "0899999999")
            .await
            .unwrap();

        assert_eq!(summary.status, TxStatus::Success);
        assert_eq!(summary.amount, 25.0);

        let txs = ledger.recent_transactions(account.id, 20).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TxStatus::Success);
        assert_eq!(txs[0].amount, 25.0);
    }

    #[tokio::test]
    async fn test_empty_link_still_attempts_and_logs() {
        let ledger = MemoryLedger::new();
        let account = ledger.create_account("erin").await.unwrap();

        let mut provider = MockVoucherProvider::new();
        provider
            .expect_redeem()
            .withf(|code, _| code.is_empty())
            .returning(|_, _| RedeemOutcome::failed("Invalid voucher code"));

        let svc = service(ledger.clone(), provider);
        let summary = svc.redeem(&account.api_key, "!!--!!", "0812345678").await.unwrap();

        assert_eq!(summary.status, TxStatus::Failed);
        assert_eq!(ledger.transaction_count().await, 1);
    }
}
