//! Administrator identity verification.
//!
//! [`AdminIdentityVerifier`] is the only place that decides whether a user
//! is an administrator. A user qualifies when their role is
//! [`UserRole::Admin`] *and* their email is on the configured allowlist.
//! Nothing else (email substrings, query parameters, stored flags) grants
//! admin status.

use std::collections::HashSet;

use uiforge_core::config::AuthConfig;
use uiforge_entity::user::{UserRole, UserSnapshot};

/// Pure role-and-allowlist predicate for administrator status.
#[derive(Debug, Clone, Default)]
pub struct AdminIdentityVerifier {
    /// Normalized (trimmed, lowercased) allowlisted emails.
    allowed_emails: HashSet<String>,
}

impl AdminIdentityVerifier {
    /// Creates a verifier over the given allowlist.
    pub fn new<I, S>(allowed_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_emails: allowed_emails
                .into_iter()
                .map(|e| normalize(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Creates a verifier from the `auth.admin_emails` setting.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.admin_emails)
    }

    /// Returns `true` iff the snapshot's role is admin and its email is allowlisted.
    pub fn is_verified_admin(&self, user: &UserSnapshot) -> bool {
        self.check(user.role, &user.email)
    }

    /// Role-and-email form of [`Self::is_verified_admin`], for callers that
    /// only hold token claims.
    pub fn check(&self, role: UserRole, email: &str) -> bool {
        role == UserRole::Admin && self.allowed_emails.contains(&normalize(email))
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
