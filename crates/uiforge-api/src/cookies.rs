//! Session cookies mirroring the issued tokens.
//!
//! Both cookies are `HttpOnly; Secure; SameSite=Strict; Path=/` and carry
//! a `Max-Age` matching the token they hold.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use uiforge_auth::TokenPair;

/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "uiforge_access";
/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "uiforge_refresh";

fn session_cookie(name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(max_age_seconds.max(0)))
        .build()
}

/// Jar setting both cookies for a freshly issued pair.
pub fn session_cookies(tokens: &TokenPair) -> CookieJar {
    CookieJar::new()
        .add(session_cookie(
            ACCESS_COOKIE,
            tokens.access_token.clone(),
            tokens.expires_in(),
        ))
        .add(session_cookie(
            REFRESH_COOKIE,
            tokens.refresh_token.clone(),
            tokens.refresh_expires_in(),
        ))
}

/// Jar expiring both session cookies.
pub fn cleared_cookies() -> CookieJar {
    CookieJar::new()
        .add(session_cookie(ACCESS_COOKIE, String::new(), 0))
        .add(session_cookie(REFRESH_COOKIE, String::new(), 0))
}

/// Reads a named, non-empty cookie from request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
