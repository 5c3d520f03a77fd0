//! redeemd - Voucher Redemption Backend
//!
//! Binary entry point: loads configuration from the environment, opens the
//! SQLite ledger, assembles the redemption pipeline, and serves the REST
//! API.

use std::sync::Arc;

use redeemd::api;
use redeemd::config::AppConfig;
use redeemd::logging;
use redeemd::notify::NotificationDispatcher;
use redeemd::provider::TrueMoneyClient;
use redeemd::service::RedemptionService;
use redeemd::storage::SqliteLedger;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Logging error: {}", e);
        std::process::exit(1);
    }

    config.print_summary();

    let ledger = match SqliteLedger::new(&config.db_path) {
        Ok(ledger) => ledger,
        Err(e) => {
            tracing::error!(target: "redeemd", error = %e, "failed to open ledger database");
            std::process::exit(1);
        }
    };

    let provider = TrueMoneyClient::new(&config.provider_url);
    let notifier = NotificationDispatcher::new(&config);
    let service = RedemptionService::new(Arc::new(ledger), Arc::new(provider), notifier);

    let router = api::create_router(service, config.admin_token.clone());

    if let Err(e) = api::serve(router, &config.bind_addr).await {
        tracing::error!(target: "redeemd", error = %e, "server exited with error");
        std::process::exit(1);
    }
}
