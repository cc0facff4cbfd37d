//! Credential verification and token issuance.

pub mod issuer;
pub mod store;

pub use issuer::{AuthResult, CredentialIssuer, Credentials, SignupRequest};
pub use store::{AuthenticatedIdentity, CredentialStore, FALLBACK_USER_ID, IdentitySource};
