//! Request DTOs with validation.
//!
//! Absent fields deserialize to empty values so that the credential
//! issuer can answer them with `MISSING_FIELDS` rather than the extractor
//! rejecting the body.

use serde::Deserialize;
use validator::Validate;

use uiforge_core::error::AppError;

/// Login request body.
#[derive(Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email.
    #[serde(default)]
    #[validate(length(max = 254, message = "Email is too long"))]
    pub email: String,
    /// Password.
    #[serde(default)]
    #[validate(length(max = 256, message = "Password is too long"))]
    pub password: String,
}

/// Signup request body.
#[derive(Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    /// Email.
    #[serde(default)]
    #[validate(length(max = 254, message = "Email is too long"))]
    pub email: String,
    /// Password.
    #[serde(default)]
    #[validate(length(max = 256, message = "Password is too long"))]
    pub password: String,
    /// Display name.
    #[serde(default, alias = "name")]
    #[validate(length(max = 100, message = "Display name is too long"))]
    pub display_name: Option<String>,
    /// Terms of service acceptance.
    #[serde(default)]
    pub terms_accepted: bool,
}

/// Token refresh request body.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Refresh token. Falls back to the refresh cookie when absent.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Runs `validator` rules and maps the first failure to a validation error.
pub fn validate_body<T: Validate>(body: &T) -> Result<(), AppError> {
    body.validate().map_err(|errors| {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|list| list.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Request body is invalid".to_string());
        AppError::validation(message)
    })
}
