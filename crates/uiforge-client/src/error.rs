//! Client error taxonomy.

use thiserror::Error;

use crate::transport::ApiResponse;

/// Errors surfaced by the client runtime.
///
/// `Clone` so that one refresh outcome can be shared by every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The server rejected the credential (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// The session could not be refreshed and was cleared.
    #[error("Session expired")]
    SessionExpired,
    /// Authenticated but not allowed (403).
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Too many requests (429).
    #[error("Rate limited")]
    RateLimited {
        /// Seconds to wait, from `Retry-After`.
        retry_after: Option<u64>,
    },
    /// The request did not complete within the configured bound.
    #[error("Request timed out after {0}ms")]
    Timeout(u64),
    /// Connection-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Any other non-success response.
    #[error("API error {status} ({code}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error code from the body.
        code: String,
        /// Message from the body.
        message: String,
    },
    /// A response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

impl ClientError {
    /// Classifies a non-success response.
    pub fn from_response(response: &ApiResponse) -> Self {
        let body: Option<ErrorBody> = serde_json::from_slice(&response.body).ok();
        let (code, message) = match body {
            Some(b) => (b.error, b.message),
            None => (String::new(), String::new()),
        };

        match response.status {
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            429 => Self::RateLimited {
                retry_after: response.retry_after(),
            },
            status => Self::Api {
                status,
                code,
                message,
            },
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
