//! Auth handlers: login, signup, refresh, profile, logout, admin check.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;

use uiforge_auth::{Credentials, SignupRequest as SignupInput, TokenPair};
use uiforge_core::error::AppError;

use crate::cookies::{REFRESH_COOKIE, cleared_cookies, read_cookie, session_cookies};
use crate::dto::request::{LoginRequest, RefreshRequest, SignupRequest, validate_body};
use crate::dto::response::{AuthResponse, MessageResponse, ProfileResponse, RefreshResponse};
use crate::error::ApiError;
use crate::extractors::{AuthUser, JsonBody};
use crate::middleware::rate_limit::client_key;
use crate::middleware::rbac::require_admin;
use crate::state::AppState;

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    validate_body(&req)?;
    let key = format!("{}|{}", client_key(&headers), req.email.trim().to_lowercase());
    state.login_limiter.check(&key).await?;

    let result = state
        .issuer
        .login(&Credentials {
            email: req.email,
            password: req.password,
        })
        .await?;

    let jar = cookies_for(&state, &result.tokens);
    Ok((jar, Json(AuthResponse::from(result))))
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    validate_body(&req)?;

    let result = state
        .issuer
        .signup(&SignupInput {
            email: req.email,
            password: req.password,
            display_name: req.display_name,
            terms_accepted: req.terms_accepted,
        })
        .await?;

    let jar = cookies_for(&state, &result.tokens);
    Ok((jar, Json(AuthResponse::from(result))))
}

/// POST /api/auth/refresh
///
/// Accepts `{"refreshToken": ...}` or, with an empty body, the refresh cookie.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(CookieJar, Json<RefreshResponse>), ApiError> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let req: RefreshRequest = serde_json::from_slice(&body)
            .map_err(|e| AppError::validation(format!("Malformed request body: {e}")))?;
        req.refresh_token.filter(|t| !t.trim().is_empty())
    };

    let token = from_body
        .or_else(|| read_cookie(&headers, REFRESH_COOKIE))
        .ok_or_else(|| AppError::unauthorized("Missing refresh token"))?;

    let tokens = state.issuer.refresh(&token).await?;

    let jar = cookies_for(&state, &tokens);
    Ok((jar, Json(RefreshResponse::from(tokens))))
}

/// GET /api/auth/profile
pub async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state.issuer.profile(auth.claims()).await?;
    let is_admin = state.rbac.verifier().is_verified_admin(&user);
    Ok(Json(ProfileResponse { user, is_admin }))
}

/// POST /api/auth/logout
///
/// Tokens are stateless; this only expires the session cookies.
pub async fn logout() -> (CookieJar, Json<MessageResponse>) {
    (
        cleared_cookies(),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

/// GET /api/auth/admin/verify
///
/// Succeeds only for a verified administrator, judged on the current record.
pub async fn verify_admin(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    require_admin(&state, &auth)?;
    let user = state.issuer.profile(auth.claims()).await?;
    state.rbac.require_admin(user.role, &user.email)?;
    Ok(Json(ProfileResponse {
        user,
        is_admin: true,
    }))
}

fn cookies_for(state: &AppState, tokens: &TokenPair) -> CookieJar {
    if state.config.auth.cookies.enabled {
        session_cookies(tokens)
    } else {
        CookieJar::new()
    }
}
