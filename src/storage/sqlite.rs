//! SQLite Persistent Ledger
//!
//! Durable storage for accounts and the transaction log that survives
//! service restarts. Uses connection pooling via r2d2 for concurrent
//! access. Balance credits are a single atomic UPDATE so concurrent
//! redemptions on one account cannot lose an increment.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::traits::{generate_api_key, LedgerStore, StorageError, StorageResult, SuccessStats};
use crate::types::{unix_now, Account, TransactionRecord, TxStatus};

/// SQLite-backed ledger with connection pooling
pub struct SqliteLedger {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteLedger {
    /// Create a new ledger with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory ledger (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                api_key TEXT NOT NULL UNIQUE,
                total_earned REAL NOT NULL DEFAULT 0,
                is_banned INTEGER NOT NULL DEFAULT 0,
                webhook_url TEXT,
                push_target TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                voucher_code TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                amount REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_api_key ON accounts(api_key);
            CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    /// Convert a database row to an Account
    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        Ok(Account {
            id: row.get("id")?,
            username: row.get("username")?,
            api_key: row.get("api_key")?,
            total_earned: row.get("total_earned")?,
            is_banned: row.get::<_, i64>("is_banned")? != 0,
            webhook_url: row.get("webhook_url")?,
            push_target: row.get("push_target")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
        })
    }

    /// Convert a database row to a TransactionRecord
    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
        let status_str: String = row.get("status")?;
        let status = status_str.parse().unwrap_or(TxStatus::Failed);

        Ok(TransactionRecord {
            id: row.get("id")?,
            account_id: row.get("account_id")?,
            voucher_code: row.get("voucher_code")?,
            phone_number: row.get("phone_number")?,
            amount: row.get("amount")?,
            status,
            message: row.get("message")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
        })
    }

    // Synchronous helpers for the trait implementation

    fn create_account_sync(&self, username: &str) -> Result<Account, StorageError> {
        let conn = self.conn()?;
        let api_key = generate_api_key();
        let created_at = unix_now();

        conn.execute(
            "INSERT INTO accounts (username, api_key, created_at) VALUES (?1, ?2, ?3)",
            params![username, api_key, created_at as i64],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return StorageError::Duplicate(format!("api_key: {}", api_key));
                }
            }
            StorageError::Database(e.to_string())
        })?;

        Ok(Account {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            api_key,
            total_earned: 0.0,
            is_banned: false,
            webhook_url: None,
            push_target: None,
            created_at,
        })
    }

    fn get_account_by_api_key_sync(&self, api_key: &str) -> Result<Option<Account>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM accounts WHERE api_key = ?1",
            params![api_key],
            |row| Self::row_to_account(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn get_account_sync(&self, id: i64) -> Result<Option<Account>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT * FROM accounts WHERE id = ?1",
            params![id],
            |row| Self::row_to_account(row),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn credit_account_sync(&self, id: i64, amount: f64) -> Result<f64, StorageError> {
        let conn = self.conn()?;

        // Single atomic increment; never read-modify-write
        let rows = conn
            .execute(
                "UPDATE accounts SET total_earned = total_earned + ?1 WHERE id = ?2",
                params![amount, id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StorageError::NotFound(format!("account {}", id)));
        }

        conn.query_row(
            "SELECT total_earned FROM accounts WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn append_transaction_sync(&self, record: &TransactionRecord) -> Result<i64, StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO transactions (
                account_id, voucher_code, phone_number, amount, status, message, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.account_id,
                record.voucher_code,
                record.phone_number,
                record.amount,
                record.status.to_string(),
                record.message,
                record.created_at as i64,
            ],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn recent_transactions_sync(
        &self,
        account_id: i64,
        limit: u32,
    ) -> Result<Vec<TransactionRecord>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT * FROM transactions WHERE account_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let records = stmt
            .query_map(params![account_id, limit], |row| {
                Self::row_to_transaction(row)
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(records)
    }

    fn success_stats_sync(&self, account_id: i64) -> Result<SuccessStats, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(amount), 0)
            FROM transactions WHERE account_id = ?1 AND status = 'SUCCESS'
            "#,
            params![account_id],
            |row| {
                Ok(SuccessStats {
                    count: row.get::<_, i64>(0)? as u64,
                    total_amount: row.get(1)?,
                })
            },
        )
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn set_notify_targets_sync(
        &self,
        id: i64,
        webhook_url: Option<String>,
        push_target: Option<String>,
    ) -> Result<(), StorageError> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "UPDATE accounts SET webhook_url = ?1, push_target = ?2 WHERE id = ?3",
                params![webhook_url, push_target, id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StorageError::NotFound(format!("account {}", id)));
        }

        Ok(())
    }

    fn rotate_api_key_sync(&self, id: i64) -> Result<String, StorageError> {
        let conn = self.conn()?;
        let new_key = generate_api_key();

        let rows = conn
            .execute(
                "UPDATE accounts SET api_key = ?1 WHERE id = ?2",
                params![new_key, id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StorageError::NotFound(format!("account {}", id)));
        }

        Ok(new_key)
    }

    fn set_banned_sync(&self, id: i64, banned: bool) -> Result<(), StorageError> {
        let conn = self.conn()?;

        let rows = conn
            .execute(
                "UPDATE accounts SET is_banned = ?1 WHERE id = ?2",
                params![banned as i64, id],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if rows == 0 {
            return Err(StorageError::NotFound(format!("account {}", id)));
        }

        Ok(())
    }

    fn total_redeemed_sync(&self) -> Result<f64, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE status = 'SUCCESS'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Database(e.to_string()))
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn create_account(&self, username: &str) -> StorageResult<Account> {
        self.create_account_sync(username)
    }

    async fn get_account_by_api_key(&self, api_key: &str) -> StorageResult<Option<Account>> {
        self.get_account_by_api_key_sync(api_key)
    }

    async fn get_account(&self, id: i64) -> StorageResult<Option<Account>> {
        self.get_account_sync(id)
    }

    async fn credit_account(&self, id: i64, amount: f64) -> StorageResult<f64> {
        self.credit_account_sync(id, amount)
    }

    async fn append_transaction(&self, record: &TransactionRecord) -> StorageResult<i64> {
        self.append_transaction_sync(record)
    }

    async fn recent_transactions(
        &self,
        account_id: i64,
        limit: u32,
    ) -> StorageResult<Vec<TransactionRecord>> {
        self.recent_transactions_sync(account_id, limit)
    }

    async fn success_stats(&self, account_id: i64) -> StorageResult<SuccessStats> {
        self.success_stats_sync(account_id)
    }

    async fn set_notify_targets(
        &self,
        id: i64,
        webhook_url: Option<String>,
        push_target: Option<String>,
    ) -> StorageResult<()> {
        self.set_notify_targets_sync(id, webhook_url, push_target)
    }

    async fn rotate_api_key(&self, id: i64) -> StorageResult<String> {
        self.rotate_api_key_sync(id)
    }

    async fn set_banned(&self, id: i64, banned: bool) -> StorageResult<()> {
        self.set_banned_sync(id, banned)
    }

    async fn total_redeemed(&self) -> StorageResult<f64> {
        self.total_redeemed_sync()
    }
}
