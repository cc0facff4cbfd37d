//! Client-visible user projection.

use serde::{Deserialize, Serialize};

use super::role::UserRole;

/// The identity a client holds for the logged-in user.
///
/// Stored verbatim by the client session and restored as-is after a
/// reload; it is never rebuilt from token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// User identifier.
    pub id: String,
    /// Login email.
    pub email: String,
    /// Role at the time the snapshot was taken.
    pub role: UserRole,
    /// Display name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
