//! UIForge auth server.
//!
//! Main entry point that wires the auth crates together and starts the server.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use uiforge_core::config::AppConfig;
use uiforge_core::error::AppError;
use uiforge_database::{DatabasePool, PgUserRepository, UserRepository};

#[tokio::main]
async fn main() {
    let env = std::env::var("UIFORGE_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting UIForge auth server v{}", env!("CARGO_PKG_VERSION"));

    // The pool connects lazily so the server comes up (and serves the
    // fallback login) while the database is down.
    let db = DatabasePool::connect_lazy(&config.database)?;

    if config.database.run_migrations {
        match uiforge_database::migration::run_migrations(db.pool()).await {
            Ok(()) => tracing::info!("Database migrations complete"),
            Err(e) => tracing::error!(error = %e, "Migrations skipped, database unreachable"),
        }
    }

    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db.into_pool()));

    uiforge_api::run_server(config, users).await
}
