//! End-to-end tests of the client session runtime against the real router.

mod helpers;

use std::sync::Arc;

use serde_json::json;

use helpers::{ADMIN_EMAIL, PASSWORD, TestApp, USER_EMAIL};
use uiforge_auth::AdminIdentityVerifier;
use uiforge_client::{
    ApiRequest, AuthClient, ClientError, GateOutcome, GateState, KeyValueStorage, MemoryStorage,
    RouteGate, RouteRequirement, Session, SessionEvent, TokenSet,
};

const PROFILE: &str = "/api/auth/profile";
const REFRESH: &str = "/api/auth/refresh";

async fn force_expiry(app: &TestApp, client: &AuthClient, session: &Session) -> String {
    let expired = app.expired_access_token(&json!({
        "user": session.user,
        "sessionId": session.session_id,
    }));
    let store = client.session();
    let current = store.current().await.unwrap();
    let epoch = store.epoch().await;
    assert!(
        store
            .replace_tokens(
                epoch,
                TokenSet {
                    access_token: expired.clone(),
                    refresh_token: current.tokens.refresh_token,
                },
            )
            .await
            .unwrap()
    );
    expired
}

#[tokio::test]
async fn test_login_profile_expiry_transparent_refresh() {
    let app = TestApp::new().await;
    let (client, transport) = app.client();
    let mut events = client.coordinator().subscribe();

    let session = client.login(ADMIN_EMAIL, PASSWORD).await.unwrap();
    let profile = client.fetch_profile().await.unwrap();
    assert!(profile.is_admin);
    assert_eq!(profile.user, session.user);

    let expired = force_expiry(&app, &client, &session).await;

    let profile = client.fetch_profile().await.unwrap();
    assert_eq!(profile.user.email, ADMIN_EMAIL);
    assert_eq!(transport.count(REFRESH), 1);
    assert_eq!(transport.count(PROFILE), 3);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);

    let current = client.session().current().await.unwrap();
    assert_ne!(current.tokens.access_token, expired);
    assert_eq!(current.user, session.user);
    assert_eq!(current.session_id, session.session_id);
}

#[tokio::test]
async fn test_concurrent_expired_requests_refresh_once() {
    let app = TestApp::new().await;
    let (client, transport) = app.client();
    let session = client.login(USER_EMAIL, PASSWORD).await.unwrap();
    force_expiry(&app, &client, &session).await;

    let (a, b) = tokio::join!(
        client.request(ApiRequest::get(PROFILE)),
        client.request(ApiRequest::get(PROFILE)),
    );
    assert_eq!(a.unwrap().status, 200);
    assert_eq!(b.unwrap().status, 200);
    assert_eq!(transport.count(REFRESH), 1);
}

#[tokio::test]
async fn test_session_survives_reload() {
    let app = TestApp::new().await;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());

    let (client, _) = app.client_with_storage(Arc::clone(&storage));
    let session = client.login(USER_EMAIL, PASSWORD).await.unwrap();

    let (reloaded, _) = app.client_with_storage(storage);
    let restored = reloaded.restore().await.unwrap().unwrap();
    assert_eq!(restored, session);

    let profile = reloaded.fetch_profile().await.unwrap();
    assert_eq!(profile.user.id, session.user.id);
}

#[tokio::test]
async fn test_invalid_login_leaves_no_session() {
    let app = TestApp::new().await;
    let (client, _) = app.client();

    let err = client.login(USER_EMAIL, "wrong").await.unwrap_err();
    assert_eq!(err, ClientError::Unauthorized("Invalid email or password".to_string()));
    assert!(client.session().current().await.is_none());
}

#[tokio::test]
async fn test_logout_then_request_does_not_refresh() {
    let app = TestApp::new().await;
    let (client, transport) = app.client();
    client.login(USER_EMAIL, PASSWORD).await.unwrap();

    client.logout().await.unwrap();
    assert!(client.session().current().await.is_none());

    let err = client.fetch_profile().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert_eq!(transport.count(REFRESH), 0);
}

#[tokio::test]
async fn test_deactivated_user_session_expires() {
    let app = TestApp::new().await;
    let (client, _) = app.client();
    let mut events = client.coordinator().subscribe();

    let session = client.login(USER_EMAIL, PASSWORD).await.unwrap();
    app.users.set_active(&session.user.id, false);
    force_expiry(&app, &client, &session).await;

    let err = client.fetch_profile().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(_)));
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
    assert!(client.session().current().await.is_none());
}

#[tokio::test]
async fn test_route_gate_over_live_profiles() {
    let app = TestApp::new().await;
    let verifier = AdminIdentityVerifier::from_config(&app.config.auth);

    let (admin, _) = app.client();
    admin.login(ADMIN_EMAIL, PASSWORD).await.unwrap();
    let gate = RouteGate::new(
        Arc::clone(admin.session()),
        Arc::new(admin.clone()),
        verifier.clone(),
    );
    assert_eq!(gate.check(&RouteRequirement::Admin, "/admin").await, GateOutcome::Allow);

    let (user, _) = app.client();
    user.login(USER_EMAIL, PASSWORD).await.unwrap();
    let gate = RouteGate::new(
        Arc::clone(user.session()),
        Arc::new(user.clone()),
        verifier.clone(),
    );
    assert_eq!(
        gate.check(&RouteRequirement::Admin, "/admin").await,
        GateOutcome::InsufficientRole
    );
    assert_eq!(
        gate.check(&RouteRequirement::Authenticated, "/home").await,
        GateOutcome::Allow
    );
}

#[tokio::test]
async fn test_adopted_tokens_resolve_profile_through_gate() {
    let app = TestApp::new().await;
    let (_, login) = app.login(USER_EMAIL, PASSWORD).await;

    let (client, transport) = app.client();
    client
        .session()
        .adopt_tokens(
            TokenSet {
                access_token: login["accessToken"].as_str().unwrap().to_string(),
                refresh_token: login["refreshToken"].as_str().unwrap().to_string(),
            },
            login["sessionId"].as_str().unwrap().to_string(),
        )
        .await;

    let gate = RouteGate::new(
        Arc::clone(client.session()),
        Arc::new(client.clone()),
        AdminIdentityVerifier::from_config(&app.config.auth),
    );
    assert_eq!(gate.state().await, GateState::AuthenticatedNoProfile);
    assert_eq!(
        gate.check(&RouteRequirement::Authenticated, "/home").await,
        GateOutcome::Allow
    );
    assert_eq!(gate.state().await, GateState::Authenticated);
    assert_eq!(transport.count(PROFILE), 1);
    assert_eq!(client.session().user().await.unwrap().email, USER_EMAIL);
}

#[tokio::test]
async fn test_proactive_refresh_renews_stale_access_token() {
    let app = TestApp::new().await;
    let (client, transport) = app.client();
    let mut events = client.coordinator().subscribe();

    let session = client.login(USER_EMAIL, PASSWORD).await.unwrap();
    let stale = force_expiry(&app, &client, &session).await;

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    let refresher = client.start_proactive_refresh(shutdown);

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("no refresh");
    assert_eq!(event.unwrap(), SessionEvent::Refreshed);
    assert_eq!(transport.count(REFRESH), 1);
    assert_ne!(client.session().access_token().await.unwrap(), stale);

    let profile = client.fetch_profile().await.unwrap();
    assert_eq!(profile.user.email, USER_EMAIL);
    assert_eq!(transport.count(REFRESH), 1);

    stop.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), refresher)
        .await
        .expect("refresher did not stop")
        .unwrap();
}
