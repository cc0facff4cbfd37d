//! JWT claims structure used in access and refresh tokens.

use serde::{Deserialize, Serialize};

use uiforge_entity::user::UserRole;

/// JWT claims payload embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID.
    pub sub: String,
    /// Email at the time of issuance.
    pub email: String,
    /// Role at the time of issuance.
    pub role: UserRole,
    /// Session identifier shared by every token minted for one login.
    pub sid: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Unique token id.
    pub jti: String,
    /// Token type: "access" or "refresh".
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

/// Distinguishes access tokens from refresh tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token for API requests.
    Access,
    /// Long-lived refresh token for obtaining new access tokens.
    Refresh,
}

impl Claims {
    /// Returns the user ID from the subject claim.
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// Returns the session ID.
    pub fn session_id(&self) -> &str {
        &self.sid
    }
}
