//! Credential lookup and verification with an outage fallback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, warn};

use uiforge_core::config::AuthConfig;
use uiforge_core::error::{AppError, ErrorKind};
use uiforge_core::result::AppResult;
use uiforge_database::UserRepository;
use uiforge_entity::user::{CreateUser, User, UserRole, UserSnapshot};

use crate::password::PasswordHasher;

/// Subject id carried by tokens minted for the fallback operator.
pub const FALLBACK_USER_ID: &str = "fallback-operator";

const DECOY_PASSWORD: &str = "uiforge-unknown-account";

/// Where an authenticated identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// A record in the user store.
    Store,
    /// The configured operator account, used during a store outage.
    Fallback,
}

/// A verified identity ready for token issuance.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    /// Client-visible user projection.
    pub user: UserSnapshot,
    /// Which path verified it.
    pub source: IdentitySource,
}

/// The operator account, with its password already hashed.
#[derive(Clone)]
struct FallbackIdentity {
    email: String,
    password_hash: String,
    display_name: String,
}

impl FallbackIdentity {
    fn matches_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email.trim())
    }

    fn as_user(&self) -> User {
        let now = Utc::now();
        User {
            id: FALLBACK_USER_ID.to_string(),
            email: self.email.clone(),
            password_hash: self.password_hash.clone(),
            display_name: Some(self.display_name.clone()),
            role: UserRole::Admin,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Looks up users and verifies passwords against the user store.
///
/// Precedence for [`CredentialStore::authenticate`]:
/// a real record is always used when the store answers; the fallback
/// operator account is consulted only when the store is unreachable.
#[derive(Clone)]
pub struct CredentialStore {
    /// User store collaborator.
    users: Arc<dyn UserRepository>,
    /// Password hasher.
    hasher: Arc<PasswordHasher>,
    /// Operator account, when enabled.
    fallback: Option<FallbackIdentity>,
    /// Hash verified against when the email is unknown, so every miss costs the same.
    decoy_hash: String,
    /// Upper bound for one store call.
    store_timeout: Duration,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("users", &self.users)
            .field("fallback_enabled", &self.fallback.is_some())
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl CredentialStore {
    /// Creates a credential store. Hashes the fallback password up front.
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<PasswordHasher>,
        config: &AuthConfig,
    ) -> AppResult<Self> {
        let fallback = if config.fallback.enabled {
            Some(FallbackIdentity {
                email: config.fallback.email.trim().to_lowercase(),
                password_hash: hasher.hash_password(&config.fallback.password)?,
                display_name: config.fallback.display_name.clone(),
            })
        } else {
            None
        };

        let decoy_hash = hasher.hash_password(DECOY_PASSWORD)?;

        Ok(Self {
            users,
            hasher,
            fallback,
            decoy_hash,
            store_timeout: Duration::from_millis(config.store_timeout_ms),
        })
    }

    /// Case-insensitive lookup by email.
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.bounded("find_by_email", self.users.find_by_email(email))
            .await
    }

    /// Lookup by id.
    ///
    /// The fallback operator id resolves only while the store is
    /// unreachable; against a healthy store it is simply unknown.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        match self.bounded("find_by_id", self.users.find_by_id(id)).await {
            Err(e) if e.is(ErrorKind::BackendUnavailable) && id == FALLBACK_USER_ID => {
                match &self.fallback {
                    Some(fallback) => {
                        warn!(fallback = true, "User store unreachable, resolving fallback operator");
                        Ok(Some(fallback.as_user()))
                    }
                    None => Err(e),
                }
            }
            other => other,
        }
    }

    /// Creates a user record.
    pub async fn create_user(&self, data: &CreateUser) -> AppResult<User> {
        self.bounded("create", self.users.create(data)).await
    }

    /// Checks a plaintext password against the user's stored hash.
    pub fn verify_password(&self, user: &User, plaintext: &str) -> AppResult<bool> {
        self.hasher.verify_password(plaintext, &user.password_hash)
    }

    /// Verifies credentials, falling back to the operator account during outages.
    ///
    /// Every failure to match is reported as `InvalidCredentials`, whether
    /// the email is unknown, the password is wrong, or the account is
    /// deactivated.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> AppResult<AuthenticatedIdentity> {
        match self.find_by_email(email).await {
            Ok(Some(user)) => {
                let password_ok = self.verify_password(&user, password)?;
                if !password_ok || !user.can_login() {
                    return Err(AppError::invalid_credentials());
                }
                Ok(AuthenticatedIdentity {
                    user: user.snapshot(),
                    source: IdentitySource::Store,
                })
            }
            Ok(None) => {
                self.hasher.verify_password(password, &self.decoy_hash)?;
                Err(AppError::invalid_credentials())
            }
            Err(e) if e.is(ErrorKind::BackendUnavailable) => {
                self.authenticate_fallback(email, password, e)
            }
            Err(e) => Err(e),
        }
    }

    fn authenticate_fallback(
        &self,
        email: &str,
        password: &str,
        outage: AppError,
    ) -> AppResult<AuthenticatedIdentity> {
        let Some(fallback) = &self.fallback else {
            error!(error = %outage, "User store unreachable and fallback disabled");
            return Err(outage);
        };

        if !fallback.matches_email(email)
            || !self.hasher.verify_password(password, &fallback.password_hash)?
        {
            error!(error = %outage, "User store unreachable, login rejected");
            return Err(AppError::invalid_credentials());
        }

        warn!(
            fallback = true,
            email = %fallback.email,
            error = %outage,
            "User store unreachable, operator authenticated via fallback identity"
        );

        Ok(AuthenticatedIdentity {
            user: fallback.as_user().snapshot(),
            source: IdentitySource::Fallback,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::backend_unavailable(format!(
                "User store did not answer {operation} within {}ms",
                self.store_timeout.as_millis()
            ))),
        }
    }
}
