//! Response DTOs.

use serde::{Deserialize, Serialize};

use uiforge_auth::{AuthResult, TokenPair};
use uiforge_entity::user::UserSnapshot;

/// Login and signup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// The authenticated user.
    pub user: UserSnapshot,
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    /// Session identifier.
    pub session_id: String,
}

impl From<AuthResult> for AuthResponse {
    fn from(result: AuthResult) -> Self {
        Self {
            user: result.user,
            access_token: result.tokens.access_token,
            refresh_token: result.tokens.refresh_token,
            expires_in: result.expires_in,
            session_id: result.session_id,
        }
    }
}

/// Refresh response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    /// New access token.
    pub access_token: String,
    /// Rotated refresh token.
    pub refresh_token: String,
    /// Seconds until the new access token expires.
    pub expires_in: i64,
}

impl From<TokenPair> for RefreshResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            expires_in: tokens.expires_in(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }
}

/// Profile response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// Current user record.
    pub user: UserSnapshot,
    /// Verified-admin flag computed by the admin verifier.
    pub is_admin: bool,
}

/// Simple message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Message.
    pub message: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
}
