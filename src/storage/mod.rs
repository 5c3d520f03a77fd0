//! Storage Layer Module
//!
//! Provides persistence for accounts and the transaction log.
//!
//! This module contains:
//! - The `LedgerStore` trait definition for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{generate_api_key, LedgerStore, StorageError, StorageResult, SuccessStats};
