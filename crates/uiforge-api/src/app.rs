//! Application builder: wires the auth stack into state and serves it.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use uiforge_auth::{
    AdminIdentityVerifier, CredentialIssuer, CredentialStore, JwtDecoder, JwtEncoder,
    PasswordHasher, PasswordValidator, RbacEnforcer,
};
use uiforge_core::config::AppConfig;
use uiforge_core::error::AppError;
use uiforge_database::UserRepository;

use crate::middleware::rate_limit::RateLimiter;
use crate::router::build_router;
use crate::state::AppState;

/// How often idle login rate limit buckets are dropped.
const LIMITER_PRUNE_PERIOD: Duration = Duration::from_secs(60);

/// Builds the shared state over the given user store.
pub fn build_state(config: AppConfig, users: Arc<dyn UserRepository>) -> Result<AppState, AppError> {
    if config.auth.jwt_secret.trim().is_empty() {
        return Err(AppError::configuration("auth.jwt_secret must be set"));
    }

    let hasher = Arc::new(PasswordHasher::new());
    let store = Arc::new(CredentialStore::new(users, Arc::clone(&hasher), &config.auth)?);
    let issuer = Arc::new(CredentialIssuer::new(
        store,
        hasher,
        Arc::new(PasswordValidator::new(&config.auth)),
        Arc::new(JwtEncoder::new(&config.auth)),
        Arc::new(JwtDecoder::new(&config.auth)),
    ));
    let rbac = Arc::new(RbacEnforcer::new(AdminIdentityVerifier::from_config(
        &config.auth,
    )));
    let login_limiter = RateLimiter::new(
        config.auth.login_rate_limit.max_attempts,
        config.auth.login_rate_limit.refill_per_second,
    );

    if config.auth.fallback.enabled {
        tracing::info!(
            email = %config.auth.fallback.email,
            "Fallback operator identity enabled for user store outages"
        );
    }

    Ok(AppState {
        config: Arc::new(config),
        issuer,
        rbac,
        login_limiter,
    })
}

/// Runs the HTTP server until Ctrl-C.
pub async fn run_server(config: AppConfig, users: Arc<dyn UserRepository>) -> Result<(), AppError> {
    let addr = config.server.bind_address();
    let state = build_state(config, users)?;
    let pruner = state.login_limiter.spawn_pruner(LIMITER_PRUNE_PERIOD);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        AppError::with_source(
            uiforge_core::error::ErrorKind::Configuration,
            format!("Failed to bind {addr}"),
            e,
        )
    })?;
    tracing::info!(address = %addr, "UIForge auth server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    pruner.abort();
    served.map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
