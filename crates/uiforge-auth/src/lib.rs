//! # uiforge-auth
//!
//! Server-side authentication for the UIForge platform.
//!
//! ## Modules
//!
//! - `jwt`: access/refresh token creation and validation
//! - `password`: Argon2id password hashing and signup policy
//! - `credential`: the credential store (with outage fallback) and issuer
//! - `admin`: the single administrator predicate
//! - `rbac`: role requirements for protected operations

pub mod admin;
pub mod credential;
pub mod jwt;
pub mod password;
pub mod rbac;

pub use admin::AdminIdentityVerifier;
pub use credential::{
    AuthResult, AuthenticatedIdentity, CredentialIssuer, CredentialStore, Credentials,
    IdentitySource, SignupRequest,
};
pub use jwt::{Claims, JwtDecoder, JwtEncoder, TokenPair, TokenType};
pub use password::{PasswordHasher, PasswordValidator};
pub use rbac::RbacEnforcer;
