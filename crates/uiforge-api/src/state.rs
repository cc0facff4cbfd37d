//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use uiforge_auth::{CredentialIssuer, RbacEnforcer};
use uiforge_core::config::AppConfig;

use crate::middleware::rate_limit::RateLimiter;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are cheap to clone across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Login, signup, refresh and profile operations
    pub issuer: Arc<CredentialIssuer>,
    /// Role checks, including the verified-admin predicate
    pub rbac: Arc<RbacEnforcer>,
    /// Token bucket guarding the login endpoint
    pub login_limiter: RateLimiter,
}
