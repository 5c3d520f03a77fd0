//! Environment-based Configuration
//!
//! Loads all runtime settings from environment variables into an immutable
//! value that is injected into the components that need it. Tokens never
//! come from hardcoded values.
//!
//! # Environment Variables
//!
//! - `REDEEMD_BIND` - Listen address (default: "0.0.0.0:8000")
//! - `REDEEMD_DB_PATH` - SQLite database path (default: "redeemd.db")
//! - `REDEEMD_PROVIDER_URL` - Voucher provider base URL
//!   (default: "https://gift.truemoney.com")
//! - `REDEEMD_PUSH_URL` - Push-message provider base URL
//!   (default: "https://api.line.me")
//! - `REDEEMD_PUSH_TOKEN` - Push-provider channel access token (optional;
//!   push notifications are disabled without it)
//! - `REDEEMD_ADMIN_TOKEN` - Bearer token for the admin endpoints (optional;
//!   admin endpoints reject everything without it)
//! - `REDEEMD_LOG_LEVEL` - Logging level (default: "info")
//! - `REDEEMD_LOG_JSON` - Set to "1" for JSON log output

use std::env;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Immutable application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listen address for the HTTP server
    pub bind_addr: String,

    /// Path to the SQLite ledger database
    pub db_path: String,

    /// Base URL of the external voucher provider
    pub provider_url: String,

    /// Base URL of the push-message provider
    pub push_url: String,

    /// Push-provider channel access token, if configured
    pub push_token: Option<String>,

    /// Bearer token guarding the admin endpoints, if configured
    pub admin_token: Option<String>,

    /// Log level
    pub log_level: String,

    /// Emit JSON-formatted logs
    pub log_json: bool,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("REDEEMD_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        // Reject addresses the listener cannot bind; fail fast at startup
        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue(
                "REDEEMD_BIND".to_string(),
                bind_addr,
            ));
        }

        let db_path = env::var("REDEEMD_DB_PATH").unwrap_or_else(|_| "redeemd.db".to_string());

        let provider_url = env::var("REDEEMD_PROVIDER_URL")
            .unwrap_or_else(|_| "https://gift.truemoney.com".to_string());

        let push_url =
            env::var("REDEEMD_PUSH_URL").unwrap_or_else(|_| "https://api.line.me".to_string());

        let push_token = env::var("REDEEMD_PUSH_TOKEN").ok().filter(|t| !t.is_empty());
        let admin_token = env::var("REDEEMD_ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        let log_level = env::var("REDEEMD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("REDEEMD_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            bind_addr,
            db_path,
            provider_url,
            push_url,
            push_token,
            admin_token,
            log_level,
            log_json,
        })
    }

    /// Defaults for tests, no environment access
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: ":memory:".to_string(),
            provider_url: "https://gift.truemoney.com".to_string(),
            push_url: "https://api.line.me".to_string(),
            push_token: None,
            admin_token: None,
            log_level: "debug".to_string(),
            log_json: false,
        }
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== redeemd Configuration ===");
        println!("Bind: {}", self.bind_addr);
        println!("Database: {}", self.db_path);
        println!("Provider: {}", self.provider_url);
        println!("Push API: {}", self.push_url);
        println!(
            "Push Token: {}",
            if self.push_token.is_some() { "set" } else { "not set" }
        );
        println!(
            "Admin Token: {}",
            if self.admin_token.is_some() { "set" } else { "not set" }
        );
        println!("Log Level: {}", self.log_level);
        println!("=============================");
    }
}
