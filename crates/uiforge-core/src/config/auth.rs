//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Authentication and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret key for JWT signing (HMAC-SHA256).
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token TTL in minutes.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_minutes: u64,
    /// Refresh token TTL in days.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_days: u64,
    /// Clock-skew leeway applied to `exp` checks, in seconds.
    #[serde(default)]
    pub jwt_leeway_seconds: u64,
    /// Minimum password length for signup.
    #[serde(default = "default_password_min")]
    pub password_min_length: usize,
    /// Minimum zxcvbn score (0-4) for signup passwords.
    #[serde(default = "default_password_score")]
    pub password_min_score: u8,
    /// Upper bound for a single user-store call in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    /// Emails allowed to act as administrators (role must also be admin).
    #[serde(default = "default_admin_emails")]
    pub admin_emails: Vec<String>,
    /// Operator identity used while the user store is unreachable.
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Cookie issuance on login.
    #[serde(default)]
    pub cookies: CookieConfig,
    /// Login attempt throttling.
    #[serde(default)]
    pub login_rate_limit: RateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_ttl_minutes: default_access_ttl(),
            refresh_ttl_days: default_refresh_ttl(),
            jwt_leeway_seconds: 0,
            password_min_length: default_password_min(),
            password_min_score: default_password_score(),
            store_timeout_ms: default_store_timeout(),
            admin_emails: default_admin_emails(),
            fallback: FallbackConfig::default(),
            cookies: CookieConfig::default(),
            login_rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Hard-wired operator account accepted only during store outages.
#[derive(Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Whether the fallback path is available at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Operator email.
    #[serde(default = "default_fallback_email")]
    pub email: String,
    /// Operator password (hashed at startup, never kept in plaintext).
    #[serde(default = "default_fallback_password")]
    pub password: String,
    /// Display name reported for the operator.
    #[serde(default = "default_fallback_name")]
    pub display_name: String,
}

impl std::fmt::Debug for FallbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackConfig")
            .field("enabled", &self.enabled)
            .field("email", &self.email)
            .field("password", &"****")
            .finish()
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            email: default_fallback_email(),
            password: default_fallback_password(),
            display_name: default_fallback_name(),
        }
    }
}

/// Cookie settings for issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Whether login/signup/refresh also set token cookies.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Token bucket settings for the login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Burst size per email.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Tokens regained per second.
    #[serde(default = "default_refill_rate")]
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            refill_per_second: default_refill_rate(),
        }
    }
}

fn default_jwt_secret() -> String {
    "CHANGE_ME_IN_PRODUCTION".to_string()
}

fn default_access_ttl() -> u64 {
    15
}

fn default_refresh_ttl() -> u64 {
    30
}

fn default_password_min() -> usize {
    8
}

fn default_password_score() -> u8 {
    2
}

fn default_store_timeout() -> u64 {
    3000
}

fn default_admin_emails() -> Vec<String> {
    vec![default_fallback_email()]
}

fn default_fallback_email() -> String {
    "admin@example.com".to_string()
}

fn default_fallback_password() -> String {
    "Operator!Fallback2024".to_string()
}

fn default_fallback_name() -> String {
    "Operator".to_string()
}

fn default_max_attempts() -> u32 {
    10
}

fn default_refill_rate() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}
