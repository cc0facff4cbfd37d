//! JWT token creation with configurable signing and TTL.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use uiforge_core::config::AuthConfig;
use uiforge_core::error::AppError;
use uiforge_entity::user::UserSnapshot;

use super::claims::{Claims, TokenType};

/// Creates signed JWT access and refresh tokens.
#[derive(Clone)]
pub struct JwtEncoder {
    /// HMAC secret key for signing.
    encoding_key: EncodingKey,
    /// Access token lifetime.
    access_ttl: Duration,
    /// Refresh token lifetime.
    refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Result of a successful token pair generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Access token expiration timestamp.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token expiration timestamp.
    pub refresh_expires_at: DateTime<Utc>,
}

impl TokenPair {
    /// Access token lifetime in seconds, as surfaced to clients.
    pub fn expires_in(&self) -> i64 {
        (self.access_expires_at - Utc::now()).num_seconds().max(0)
    }

    /// Refresh token lifetime in seconds.
    pub fn refresh_expires_in(&self) -> i64 {
        (self.refresh_expires_at - Utc::now()).num_seconds().max(0)
    }
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: Duration::minutes(config.access_ttl_minutes as i64),
            refresh_ttl: Duration::days(config.refresh_ttl_days as i64),
        }
    }

    /// Access token lifetime in whole seconds.
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Generates a new access + refresh token pair for the given user and session.
    pub fn generate_token_pair(
        &self,
        user: &UserSnapshot,
        session_id: &str,
    ) -> Result<TokenPair, AppError> {
        let now = Utc::now();
        let access_exp = now + self.access_ttl;
        let refresh_exp = now + self.refresh_ttl;

        let access_claims = build_claims(user, session_id, now, access_exp, TokenType::Access);
        let refresh_claims = build_claims(user, session_id, now, refresh_exp, TokenType::Refresh);

        Ok(TokenPair {
            access_token: self.encode_claims(&access_claims)?,
            refresh_token: self.encode_claims(&refresh_claims)?,
            access_expires_at: access_exp,
            refresh_expires_at: refresh_exp,
        })
    }

    /// Signs an arbitrary claims set.
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode {:?} token: {e}", claims.token_type)))
    }
}

fn build_claims(
    user: &UserSnapshot,
    session_id: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    token_type: TokenType,
) -> Claims {
    Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        role: user.role,
        sid: session_id.to_string(),
        iat: issued_at.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
        token_type,
    }
}
