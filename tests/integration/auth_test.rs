//! Integration tests for the auth endpoints.

mod helpers;

use axum::body::Body;
use http::{Request, StatusCode, header};
use serde_json::json;

use helpers::{ADMIN_EMAIL, FALLBACK_PASSWORD, PASSWORD, TestApp, USER_EMAIL};
use uiforge_entity::user::UserRole;

#[tokio::test]
async fn test_admin_login_and_profile() {
    let app = TestApp::new().await;

    let (status, body) = app.login(ADMIN_EMAIL, PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["expiresIn"], 900);
    assert!(body["user"].get("passwordHash").is_none());
    let token = body["accessToken"].as_str().unwrap();

    let (status, profile) = app.get("/api/auth/profile", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["email"], ADMIN_EMAIL);
    assert_eq!(profile["isAdmin"], true);

    let (status, _) = app.get("/api/auth/admin/verify", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_credentials_are_indistinguishable() {
    let app = TestApp::new().await;

    let (status, wrong) = app.login(USER_EMAIL, "not-the-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["error"], "INVALID_CREDENTIALS");

    let (status, unknown) = app.login("ghost@example.com", "whatever").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);
}

#[tokio::test]
async fn test_missing_fields() {
    let app = TestApp::new().await;
    let (status, body) = app.post("/api/auth/login", json!({ "email": USER_EMAIL })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MISSING_FIELDS");
}

#[tokio::test]
async fn test_signup_flow() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/auth/signup",
            json!({ "email": "new@example.com", "password": PASSWORD, "termsAccepted": false }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MISSING_FIELDS");

    let (status, body) = app
        .post(
            "/api/auth/signup",
            json!({
                "email": "new@example.com",
                "password": PASSWORD,
                "displayName": "Newcomer",
                "termsAccepted": true
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(body["user"]["displayName"], "Newcomer");
    assert!(body["sessionId"].as_str().is_some());

    let (status, body) = app
        .post(
            "/api/auth/signup",
            json!({ "email": "NEW@example.com", "password": PASSWORD, "termsAccepted": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "EMAIL_TAKEN");

    let (status, _) = app.login("new@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rotates_tokens() {
    let app = TestApp::new().await;
    let (_, login) = app.login(USER_EMAIL, PASSWORD).await;

    let (status, refreshed) = app
        .post(
            "/api/auth/refresh",
            json!({ "refreshToken": login["refreshToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(refreshed["accessToken"], login["accessToken"]);
    assert_eq!(refreshed["expiresIn"], 900);

    let (status, _) = app
        .get("/api/auth/profile", refreshed["accessToken"].as_str())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/api/auth/refresh",
            json!({ "refreshToken": login["accessToken"] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_refresh_from_cookie() {
    let app = TestApp::new().await;
    let req = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": USER_EMAIL, "password": PASSWORD }).to_string(),
        ))
        .unwrap();
    let (_, headers, _) = app.send_raw(req).await;

    let refresh_cookie = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|c| c.starts_with("uiforge_refresh="))
        .and_then(|c| c.split(';').next())
        .unwrap()
        .to_string();

    let req = Request::post("/api/auth/refresh")
        .header(header::COOKIE, refresh_cookie)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["accessToken"].as_str().is_some());
}

#[tokio::test]
async fn test_expired_access_token_is_rejected() {
    let app = TestApp::new().await;
    let (_, login) = app.login(USER_EMAIL, PASSWORD).await;
    let expired = app.expired_access_token(&login);

    let (status, body) = app.get("/api/auth/profile", Some(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_fallback_login_only_during_outage() {
    let app = TestApp::new().await;

    let (status, _) = app.login(ADMIN_EMAIL, FALLBACK_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.users.set_available(false);

    let (status, body) = app.login(ADMIN_EMAIL, FALLBACK_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
    let token = body["accessToken"].as_str().unwrap().to_string();

    let (status, profile) = app.get("/api/auth/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["isAdmin"], true);

    let (status, body) = app.login(USER_EMAIL, PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_CREDENTIALS");

    app.users.set_available(true);
    let (status, _) = app.get("/api/auth/profile", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_outage_without_fallback_is_503() {
    let mut config = TestApp::test_config();
    config.auth.fallback.enabled = false;
    let app = TestApp::with_config(config).await;
    app.users.set_available(false);

    let (status, body) = app.login(ADMIN_EMAIL, FALLBACK_PASSWORD).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "BACKEND_UNAVAILABLE");
}

#[tokio::test]
async fn test_login_rate_limit() {
    let mut config = TestApp::test_config();
    config.auth.login_rate_limit.refill_per_second = 0.001;
    let app = TestApp::with_config(config).await;
    let attempts = app.config.auth.login_rate_limit.max_attempts;

    for _ in 0..attempts {
        let (status, _) = app.login("ghost@example.com", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let req = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "ghost@example.com", "password": PASSWORD }).to_string(),
        ))
        .unwrap();
    let (status, headers, body) = app.send_raw(req).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "RATE_LIMITED");
    assert!(headers.get(header::RETRY_AFTER).is_some());

    let (status, _) = app.login(USER_EMAIL, PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_endpoint_requires_verified_admin() {
    let app = TestApp::new().await;
    app.seed("impostor@example.com", UserRole::Admin).await;

    let (_, user) = app.login(USER_EMAIL, PASSWORD).await;
    let (status, body) = app
        .get("/api/auth/admin/verify", user["accessToken"].as_str())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let (_, impostor) = app.login("impostor@example.com", PASSWORD).await;
    let (status, profile) = app
        .get("/api/auth/profile", impostor["accessToken"].as_str())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["isAdmin"], false);

    let (status, _) = app
        .get("/api/auth/admin/verify", impostor["accessToken"].as_str())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
