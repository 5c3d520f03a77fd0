//! redeemd - Voucher Redemption Backend
//!
//! A registered user redeems third-party cash-voucher codes via a personal
//! API key; on success the service credits a running balance, appends an
//! audit transaction, and fans out notifications to a webhook and a
//! push-message channel, each best-effort and isolated from the other.
//!
//! ## Pipeline
//!
//! 1. **voucher** - normalizes a pasted link into the canonical code
//! 2. **provider** - calls the external voucher service and classifies
//!    the response into an explicit outcome
//! 3. **storage** - accounts and the append-only transaction log
//! 4. **notify** - webhook + push fan-out with independent failure isolation
//! 5. **service** - the orchestrator tying the above into one attempt
//! 6. **api** - the HTTP surface
//!
//! Identity (OAuth login, sessions) and HTML rendering are external
//! collaborators; they drive this service through the admin endpoints.

pub mod api;
pub mod config;
pub mod logging;
pub mod notify;
pub mod provider;
pub mod service;
pub mod storage;
pub mod types;
pub mod voucher;

// Re-exports: configuration
pub use config::{AppConfig, ConfigError};

// Re-exports: core types
pub use types::{Account, TransactionRecord, TxStatus};

// Re-exports: provider client
pub use provider::{RedeemOutcome, TrueMoneyClient, VoucherProvider};

// Re-exports: notifications
pub use notify::{NotificationDispatcher, NotifyError, NotifyTestReport};

// Re-exports: storage
pub use storage::{LedgerStore, MemoryLedger, SqliteLedger, StorageError, SuccessStats};

// Re-exports: orchestrator
pub use service::{RedeemError, RedeemSummary, RedemptionService};
