//! # uiforge-api
//!
//! HTTP API layer for UIForge authentication built on Axum.
//!
//! Provides the `/api/auth/*` endpoints, the bearer/cookie `AuthUser`
//! extractor, role guards, login rate limiting, request logging, CORS,
//! and the mapping from `AppError` to HTTP responses.

pub mod app;
pub mod cookies;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_state, run_server};
pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
