//! Custom Axum extractors.

pub mod auth;
pub mod body;

pub use auth::AuthUser;
pub use body::JsonBody;
