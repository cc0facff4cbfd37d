//! # uiforge-entity
//!
//! Domain entity models for the UIForge authentication subsystem. The
//! [`user::User`] record is what the user store holds; the
//! [`user::UserSnapshot`] is the client-visible projection that travels in
//! API responses and lives in the client session.

pub mod user;
