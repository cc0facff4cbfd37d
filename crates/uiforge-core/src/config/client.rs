//! Client runtime configuration.

use serde::{Deserialize, Serialize};

/// Settings for the client-side session runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the auth API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Upper bound for login, signup, and refresh calls in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Fraction of the access token lifetime after which the proactive
    /// refresher fires.
    #[serde(default = "default_refresh_ratio")]
    pub proactive_refresh_ratio: f64,
    /// File used to persist the session. In-memory storage when unset.
    #[serde(default)]
    pub storage_path: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
            proactive_refresh_ratio: default_refresh_ratio(),
            storage_path: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_refresh_ratio() -> f64 {
    0.8
}
