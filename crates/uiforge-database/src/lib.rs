//! # uiforge-database
//!
//! PostgreSQL connection management and the user repository consumed by
//! the credential store. An in-memory repository with an outage switch
//! backs tests and local development.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use repositories::{MemoryUserRepository, PgUserRepository, UserRepository};
