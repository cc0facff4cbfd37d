//! Token issuance for login, signup, and refresh.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use uiforge_core::error::AppError;
use uiforge_core::result::AppResult;
use uiforge_entity::user::{CreateUser, UserRole, UserSnapshot};

use crate::jwt::{Claims, JwtDecoder, JwtEncoder, TokenPair};
use crate::password::{PasswordHasher, PasswordValidator};

use super::store::{CredentialStore, IdentitySource};

/// Login input. Never persisted or logged.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"****")
            .finish()
    }
}

/// Signup input.
#[derive(Clone, Deserialize)]
pub struct SignupRequest {
    /// Desired login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Whether the terms of service were accepted.
    pub terms_accepted: bool,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("terms_accepted", &self.terms_accepted)
            .finish()
    }
}

/// Outcome of a successful login or signup.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    /// The authenticated user.
    pub user: UserSnapshot,
    /// Newly minted tokens.
    pub tokens: TokenPair,
    /// Session identifier embedded in both tokens.
    pub session_id: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    /// Set when the identity came from the outage fallback.
    pub fallback: bool,
}

/// Turns verified credentials into token pairs.
///
/// Stateless: callers persist whatever session they need from the
/// returned [`AuthResult`].
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    /// Credential lookup and verification.
    store: Arc<CredentialStore>,
    /// Password hasher for signup.
    hasher: Arc<PasswordHasher>,
    /// Signup password policy.
    validator: Arc<PasswordValidator>,
    /// Token minting.
    encoder: Arc<JwtEncoder>,
    /// Token validation.
    decoder: Arc<JwtDecoder>,
}

impl CredentialIssuer {
    /// Creates a new issuer with all required dependencies.
    pub fn new(
        store: Arc<CredentialStore>,
        hasher: Arc<PasswordHasher>,
        validator: Arc<PasswordValidator>,
        encoder: Arc<JwtEncoder>,
        decoder: Arc<JwtDecoder>,
    ) -> Self {
        Self {
            store,
            hasher,
            validator,
            encoder,
            decoder,
        }
    }

    /// Verifies credentials and mints a token pair.
    pub async fn login(&self, credentials: &Credentials) -> AppResult<AuthResult> {
        let email = credentials.email.trim();
        if email.is_empty() || credentials.password.is_empty() {
            return Err(AppError::missing_fields("Email and password are required"));
        }

        let identity = self.store.authenticate(email, &credentials.password).await?;
        let fallback = identity.source == IdentitySource::Fallback;
        let result = self.issue(identity.user, fallback)?;

        info!(
            user_id = %result.user.id,
            session_id = %result.session_id,
            fallback,
            "Login successful"
        );
        Ok(result)
    }

    /// Creates an account and mints a token pair shaped like [`Self::login`]'s.
    pub async fn signup(&self, request: &SignupRequest) -> AppResult<AuthResult> {
        let email = request.email.trim().to_lowercase();
        if email.is_empty() || request.password.is_empty() {
            return Err(AppError::missing_fields("Email and password are required"));
        }
        if !request.terms_accepted {
            return Err(AppError::missing_fields("Terms of service must be accepted"));
        }
        validate_email(&email)?;

        let display_name = request
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);

        let mut user_inputs = vec![email.as_str()];
        if let Some(name) = display_name.as_deref() {
            user_inputs.push(name);
        }
        self.validator.validate(&request.password, &user_inputs)?;

        let user = self
            .store
            .create_user(&CreateUser {
                email,
                password_hash: self.hasher.hash_password(&request.password)?,
                display_name,
                role: UserRole::User,
            })
            .await?;

        let result = self.issue(user.snapshot(), false)?;
        info!(user_id = %result.user.id, "Signup successful");
        Ok(result)
    }

    /// Exchanges a refresh token for a rotated pair in the same session.
    ///
    /// The user is reloaded so role changes and deactivation take effect.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.decoder.decode_refresh_token(refresh_token)?;

        let user = self
            .store
            .find_by_id(claims.user_id())
            .await?
            .ok_or_else(|| AppError::unauthorized("Account no longer exists"))?;

        if !user.can_login() {
            warn!(user_id = %user.id, "Refresh rejected for deactivated account");
            return Err(AppError::unauthorized("Account is deactivated"));
        }

        let tokens = self
            .encoder
            .generate_token_pair(&user.snapshot(), claims.session_id())?;

        info!(
            user_id = %user.id,
            session_id = %claims.session_id(),
            "Token refreshed"
        );
        Ok(tokens)
    }

    /// Validates a bearer access token.
    pub fn authenticate_access(&self, access_token: &str) -> AppResult<Claims> {
        self.decoder.decode_access_token(access_token)
    }

    /// Loads the current profile for an authenticated caller.
    pub async fn profile(&self, claims: &Claims) -> AppResult<UserSnapshot> {
        let user = self
            .store
            .find_by_id(claims.user_id())
            .await?
            .ok_or_else(|| AppError::unauthorized("Account no longer exists"))?;

        if !user.can_login() {
            return Err(AppError::unauthorized("Account is deactivated"));
        }
        Ok(user.snapshot())
    }

    fn issue(&self, user: UserSnapshot, fallback: bool) -> AppResult<AuthResult> {
        let session_id = Uuid::new_v4().to_string();
        let tokens = self.encoder.generate_token_pair(&user, &session_id)?;
        Ok(AuthResult {
            expires_in: self.encoder.access_ttl_seconds(),
            user,
            tokens,
            session_id,
            fallback,
        })
    }
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::validation("Email address is not valid"))
    }
}
