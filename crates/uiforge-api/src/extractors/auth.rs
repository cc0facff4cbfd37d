//! `AuthUser` extractor: pulls the access token from the Authorization
//! header (or the access cookie), validates it, and exposes its claims.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use uiforge_auth::Claims;
use uiforge_core::error::AppError;

use crate::cookies::{ACCESS_COOKIE, read_cookie};
use crate::error::ApiError;
use crate::state::AppState;

/// Validated access-token claims of the caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Returns the inner claims.
    pub fn claims(&self) -> &Claims {
        &self.0
    }
}

impl std::ops::Deref for AuthUser {
    type Target = Claims;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match parts.headers.get(AUTHORIZATION) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .ok_or_else(|| AppError::unauthorized("Invalid Authorization header format"))?,
            None => read_cookie(&parts.headers, ACCESS_COOKIE)
                .ok_or_else(|| AppError::unauthorized("Missing access token"))?,
        };

        let claims = state.issuer.authenticate_access(&token)?;
        Ok(AuthUser(claims))
    }
}
