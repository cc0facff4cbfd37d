//! Bearer attachment, single-flight token refresh, and retry.
//!
//! Every request walks the phases `Attach → Dispatch → (Refresh → Retry)
//! → Done`. A 401 on a protected path triggers at most one refresh and at
//! most one retry. Concurrent 401s share a single in-flight refresh.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Deserialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use uiforge_core::config::ClientConfig;

use crate::error::{ClientError, ClientResult};
use crate::session::{SessionStore, TokenSet};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

/// Login endpoint.
pub const LOGIN_PATH: &str = "/api/auth/login";
/// Signup endpoint.
pub const SIGNUP_PATH: &str = "/api/auth/signup";
/// Refresh endpoint.
pub const REFRESH_PATH: &str = "/api/auth/refresh";
/// Password reset endpoint.
pub const RESET_PASSWORD_PATH: &str = "/api/auth/reset-password";

/// Paths that never carry a bearer token and never trigger a refresh.
pub const AUTH_EXEMPT_PATHS: [&str; 4] = [LOGIN_PATH, SIGNUP_PATH, REFRESH_PATH, RESET_PASSWORD_PATH];

/// Delay before the proactive refresher retries after a failed attempt.
const PROACTIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Returns `true` for auth endpoints.
pub fn is_auth_endpoint(path: &str) -> bool {
    let route = path.split('?').next().unwrap_or(path);
    AUTH_EXEMPT_PATHS.contains(&route)
}

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Choosing the bearer token.
    Attach,
    /// Sending.
    Dispatch,
    /// Waiting on the shared refresh after a 401.
    Refresh,
    /// Re-sending with the new token.
    Retry,
    /// Finished.
    Done,
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Tokens were rotated.
    Refreshed,
    /// Refresh failed for good; the session was cleared.
    Expired,
}

type RefreshFuture = Shared<BoxFuture<'static, ClientResult<TokenSet>>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    access_token: String,
    refresh_token: String,
}

/// Runs API requests against the current session.
pub struct TokenRefreshCoordinator {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionStore>,
    inflight: Mutex<Option<RefreshFuture>>,
    events: broadcast::Sender<SessionEvent>,
    request_timeout: Duration,
    refresh_ratio: f64,
}

impl std::fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshCoordinator")
            .field("transport", &self.transport)
            .field("request_timeout", &self.request_timeout)
            .field("refresh_ratio", &self.refresh_ratio)
            .finish()
    }
}

impl TokenRefreshCoordinator {
    /// Creates a coordinator.
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            transport,
            session,
            inflight: Mutex::new(None),
            events,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            refresh_ratio: config.proactive_refresh_ratio.clamp(0.05, 0.99),
        }
    }

    /// Session events (refreshed, expired).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The session this coordinator reads and rewrites.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Sends `request`, refreshing once on a 401 from a protected path.
    ///
    /// Non-2xx outcomes are returned as [`ClientError`]s: 401 after the
    /// retry as `Unauthorized`, 403 as `Forbidden`, 429 as `RateLimited`.
    pub async fn execute(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let exempt = is_auth_endpoint(&request.path);
        let mut phase = RequestPhase::Attach;
        let mut bearer: Option<String> = None;
        let mut retried = false;
        let mut retry_epoch: Option<u64> = None;
        let mut unauthorized: Option<ApiResponse> = None;
        let mut outcome: Option<ApiResponse> = None;

        loop {
            debug!(?phase, path = %request.route(), "Request phase");
            match phase {
                RequestPhase::Attach => {
                    if !exempt {
                        bearer = self.session.access_token().await;
                    }
                    phase = RequestPhase::Dispatch;
                }
                RequestPhase::Dispatch => {
                    let outgoing = match &bearer {
                        Some(token) => request.with_bearer(token),
                        None => request.clone(),
                    };
                    let response = self.send_bounded(outgoing).await?;

                    if response.status == 401 && !exempt && !retried {
                        unauthorized = Some(response);
                        phase = RequestPhase::Refresh;
                    } else if response.status == 401 && !exempt {
                        // Fresh tokens were rejected too; the session is unusable.
                        if let Some(epoch) = retry_epoch {
                            self.expire(epoch).await?;
                        }
                        return Err(ClientError::from_response(&response));
                    } else {
                        outcome = Some(response);
                        phase = RequestPhase::Done;
                    }
                }
                RequestPhase::Refresh => match self.recover(bearer.as_deref()).await {
                    Ok(tokens) => {
                        bearer = Some(tokens.access_token);
                        phase = RequestPhase::Retry;
                    }
                    Err(ClientError::SessionExpired) => {
                        let original = unauthorized
                            .take()
                            .map(|r| ClientError::from_response(&r))
                            .unwrap_or_else(|| ClientError::Unauthorized(String::new()));
                        return Err(original);
                    }
                    Err(e) => return Err(e),
                },
                RequestPhase::Retry => {
                    retried = true;
                    retry_epoch = Some(self.session.epoch().await);
                    phase = RequestPhase::Dispatch;
                }
                RequestPhase::Done => {
                    return match outcome.take() {
                        Some(response) => finish(response),
                        None => Err(ClientError::Transport("No response received".to_string())),
                    };
                }
            }
        }
    }

    async fn expire(&self, epoch: u64) -> ClientResult<()> {
        if self.session.clear_if_current(epoch).await? {
            warn!("Retried request rejected, session cleared");
            let _ = self.events.send(SessionEvent::Expired);
        }
        Ok(())
    }

    /// Obtains usable tokens after a 401 that carried `failed_token`.
    ///
    /// When the session already holds a different access token (another
    /// caller refreshed first), that token is used without a network call.
    async fn recover(&self, failed_token: Option<&str>) -> ClientResult<TokenSet> {
        if let Some(snapshot) = self.session.token_snapshot().await {
            if failed_token != Some(snapshot.tokens.access_token.as_str()) {
                debug!("Access token changed while request was in flight, skipping refresh");
                return Ok(snapshot.tokens);
            }
        }
        self.refresh().await
    }

    /// Refreshes the session, joining any refresh already in flight.
    pub async fn refresh(&self) -> ClientResult<TokenSet> {
        let shared = {
            let mut slot = self.inflight.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fresh = self.start_refresh().shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        let result = shared.clone().await;

        let mut slot = self.inflight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&shared)) {
            *slot = None;
        }
        result
    }

    fn start_refresh(&self) -> BoxFuture<'static, ClientResult<TokenSet>> {
        let transport = Arc::clone(&self.transport);
        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        let timeout = self.request_timeout;

        async move {
            let Some(snapshot) = session.token_snapshot().await else {
                return Err(ClientError::SessionExpired);
            };

            let request = ApiRequest::post(REFRESH_PATH).json(&serde_json::json!({
                "refreshToken": snapshot.tokens.refresh_token,
            }))?;

            let outcome = match tokio::time::timeout(timeout, transport.send(request)).await {
                Err(_) => Err(ClientError::Timeout(timeout.as_millis() as u64)),
                Ok(Err(e)) => Err(e),
                Ok(Ok(response)) if response.is_success() => {
                    response.json::<RefreshBody>().map(|body| TokenSet {
                        access_token: body.access_token,
                        refresh_token: body.refresh_token,
                    })
                }
                Ok(Ok(response)) => Err(ClientError::from_response(&response)),
            };

            match outcome {
                Ok(tokens) => {
                    if session.replace_tokens(snapshot.epoch, tokens.clone()).await? {
                        info!("Session tokens refreshed");
                        let _ = events.send(SessionEvent::Refreshed);
                        Ok(tokens)
                    } else {
                        debug!("Session changed during refresh, result discarded");
                        Err(ClientError::SessionExpired)
                    }
                }
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "Token refresh failed, session kept");
                    Err(e)
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh rejected, clearing session");
                    if session.clear_if_current(snapshot.epoch).await? {
                        let _ = events.send(SessionEvent::Expired);
                    }
                    Err(ClientError::SessionExpired)
                }
            }
        }
        .boxed()
    }

    async fn send_bounded(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        match tokio::time::timeout(self.request_timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.request_timeout.as_millis() as u64)),
        }
    }

    /// Starts the proactive refresher.
    ///
    /// The task sleeps until the configured fraction of the access token's
    /// lifetime has passed, refreshes through [`Self::refresh`], and re-arms
    /// whenever the session changes. It exits when `shutdown` flips to
    /// `true` or its sender is dropped.
    pub fn spawn_proactive_refresh(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let mut changes = this.session.subscribe();
                changes.borrow_and_update();

                let now = chrono::Utc::now().timestamp();
                let deadline = this
                    .session
                    .access_token()
                    .await
                    .and_then(|token| refresh_delay(&token, this.refresh_ratio, now))
                    .map(|delay| Instant::now() + delay);

                tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                    res = changes.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                    _ = sleep_until_opt(deadline) => {
                        debug!("Proactive refresh due");
                        if let Err(e) = this.refresh().await {
                            debug!(error = %e, "Proactive refresh failed");
                            tokio::select! {
                                _ = tokio::time::sleep(PROACTIVE_RETRY_DELAY) => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                    }
                }
            }
            debug!("Proactive refresher stopped");
        })
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn finish(response: ApiResponse) -> ClientResult<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::from_response(&response))
    }
}

fn is_transient(err: &ClientError) -> bool {
    match err {
        ClientError::Timeout(_) | ClientError::Transport(_) | ClientError::RateLimited { .. } => true,
        ClientError::Api { status, .. } => *status >= 500,
        _ => false,
    }
}

#[derive(Deserialize)]
struct LifetimeClaims {
    iat: i64,
    exp: i64,
}

/// Reads `iat`/`exp` from a JWT payload without verifying it.
///
/// Used only to schedule refreshes; never to establish identity.
fn peek_lifetime(token: &str) -> Option<(i64, i64)> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: LifetimeClaims = serde_json::from_slice(&bytes).ok()?;
    (claims.exp > claims.iat).then_some((claims.iat, claims.exp))
}

/// Time from `now` until `iat + ratio * (exp - iat)`, zero if past.
fn refresh_delay(token: &str, ratio: f64, now: i64) -> Option<Duration> {
    let (iat, exp) = peek_lifetime(token)?;
    let due = iat as f64 + ratio * (exp - iat) as f64;
    let remaining = (due - now as f64).max(0.0);
    Some(Duration::from_secs_f64(remaining))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uiforge_entity::user::{UserRole, UserSnapshot};

    use crate::session::Session;
    use crate::storage::MemoryStorage;

    /// Accepts only `access-N` where N is the current generation; refresh
    /// bumps the generation after an optional delay.
    #[derive(Debug)]
    struct MockServer {
        generation: AtomicUsize,
        refresh_calls: AtomicUsize,
        refresh_delay: Duration,
        refresh_status: u16,
        scripted: std::sync::Mutex<VecDeque<u16>>,
    }

    impl MockServer {
        fn new(refresh_delay: Duration, refresh_status: u16) -> Self {
            Self {
                generation: AtomicUsize::new(1),
                refresh_calls: AtomicUsize::new(0),
                refresh_delay,
                refresh_status,
                scripted: std::sync::Mutex::new(VecDeque::new()),
            }
        }

        fn script(&self, statuses: &[u16]) {
            self.scripted.lock().unwrap().extend(statuses);
        }
    }

    fn respond(status: u16, body: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status,
            headers: vec![("Retry-After".to_string(), "3".to_string())],
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    #[async_trait]
    impl HttpTransport for MockServer {
        async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
            if request.route() == REFRESH_PATH {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.refresh_delay).await;
                if self.refresh_status != 200 {
                    return Ok(respond(
                        self.refresh_status,
                        serde_json::json!({"error": "TOKEN_INVALID", "message": "bad refresh"}),
                    ));
                }
                let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                return Ok(respond(
                    200,
                    serde_json::json!({
                        "accessToken": format!("access-{next}"),
                        "refreshToken": format!("refresh-{next}"),
                        "expiresIn": 900,
                    }),
                ));
            }

            if let Some(status) = self.scripted.lock().unwrap().pop_front() {
                return Ok(respond(status, serde_json::json!({"error": "X", "message": "scripted"})));
            }

            let expected = format!("access-{}", self.generation.load(Ordering::SeqCst));
            if request.bearer() == Some(expected.as_str()) {
                Ok(respond(200, serde_json::json!({"ok": true})))
            } else {
                Ok(respond(
                    401,
                    serde_json::json!({"error": "TOKEN_EXPIRED", "message": "Token has expired"}),
                ))
            }
        }
    }

    async fn setup(server: MockServer) -> (Arc<MockServer>, Arc<TokenRefreshCoordinator>) {
        let server = Arc::new(server);
        let session = Arc::new(SessionStore::new(Arc::new(MemoryStorage::new())));
        session
            .persist(Session {
                tokens: TokenSet {
                    access_token: "access-0".to_string(),
                    refresh_token: "refresh-0".to_string(),
                },
                user: UserSnapshot {
                    id: "u-1".to_string(),
                    email: "dev@example.com".to_string(),
                    role: UserRole::User,
                    display_name: None,
                },
                session_id: "s-1".to_string(),
            })
            .await
            .unwrap();
        let coordinator = Arc::new(TokenRefreshCoordinator::new(
            &ClientConfig::default(),
            server.clone(),
            session,
        ));
        (server, coordinator)
    }

    #[tokio::test]
    async fn test_refresh_then_retry_once() {
        let (server, coordinator) = setup(MockServer::new(Duration::ZERO, 200)).await;
        let mut events = coordinator.subscribe();

        let response = coordinator.execute(ApiRequest::get("/api/things")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);

        let current = coordinator.session().current().await.unwrap();
        assert_eq!(current.tokens.access_token, "access-2");
        assert_eq!(current.user.email, "dev@example.com");
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let (server, coordinator) = setup(MockServer::new(Duration::from_millis(50), 200)).await;

        let (a, b) = tokio::join!(
            coordinator.execute(ApiRequest::get("/api/a")),
            coordinator.execute(ApiRequest::get("/api/b")),
        );
        assert_eq!(a.unwrap().status, 200);
        assert_eq!(b.unwrap().status, 200);
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_and_returns_original_401() {
        let (server, coordinator) = setup(MockServer::new(Duration::ZERO, 401)).await;
        let mut events = coordinator.subscribe();

        let err = coordinator.execute(ApiRequest::get("/api/things")).await.unwrap_err();
        assert_eq!(err, ClientError::Unauthorized("Token has expired".to_string()));
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
        assert!(coordinator.session().current().await.is_none());
    }

    #[tokio::test]
    async fn test_retry_rejected_after_refresh_expires_session() {
        let (server, coordinator) = setup(MockServer::new(Duration::ZERO, 200)).await;
        server.script(&[401, 401]);
        let mut events = coordinator.subscribe();

        let err = coordinator.execute(ApiRequest::get("/api/things")).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized(_)));
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
        assert!(coordinator.session().current().await.is_none());
    }

    #[tokio::test]
    async fn test_forbidden_and_rate_limited_do_not_refresh() {
        let (server, coordinator) = setup(MockServer::new(Duration::ZERO, 200)).await;
        server.script(&[403, 429]);

        let err = coordinator.execute(ApiRequest::get("/api/x")).await.unwrap_err();
        assert!(matches!(err, ClientError::Forbidden(_)));
        let err = coordinator.execute(ApiRequest::get("/api/x")).await.unwrap_err();
        assert_eq!(err, ClientError::RateLimited { retry_after: Some(3) });
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auth_endpoints_never_refresh() {
        let (server, coordinator) = setup(MockServer::new(Duration::ZERO, 200)).await;
        server.script(&[401]);

        let err = coordinator
            .execute(ApiRequest::post(LOGIN_PATH))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized(_)));
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_during_refresh_wins() {
        let (server, coordinator) = setup(MockServer::new(Duration::from_millis(50), 200)).await;

        let session = Arc::clone(coordinator.session());
        let (result, _) = tokio::join!(
            coordinator.execute(ApiRequest::get("/api/things")),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                session.clear().await.unwrap();
            }
        );

        assert!(matches!(result, Err(ClientError::Unauthorized(_))));
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(session.token_snapshot().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_times_out_and_keeps_session() {
        let (_server, coordinator) = setup(MockServer::new(Duration::from_secs(30), 200)).await;

        let err = coordinator.execute(ApiRequest::get("/api/things")).await.unwrap_err();
        assert_eq!(err, ClientError::Timeout(5000));
        assert!(coordinator.session().current().await.is_some());
    }

    fn token_with_lifetime(iat: i64, exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"iat":{iat},"exp":{exp}}}"#));
        format!("h.{payload}.s")
    }

    #[tokio::test(start_paused = true)]
    async fn test_proactive_refresh_fires_near_expiry_and_stops_on_shutdown() {
        let (server, coordinator) = setup(MockServer::new(Duration::ZERO, 200)).await;
        let now = chrono::Utc::now().timestamp();
        coordinator
            .session()
            .persist(Session {
                tokens: TokenSet {
                    access_token: token_with_lifetime(now, now + 10),
                    refresh_token: "refresh-0".to_string(),
                },
                user: UserSnapshot {
                    id: "u-1".to_string(),
                    email: "dev@example.com".to_string(),
                    role: UserRole::User,
                    display_name: None,
                },
                session_id: "s-1".to_string(),
            })
            .await
            .unwrap();

        let (stop, shutdown) = watch::channel(false);
        let handle = coordinator.spawn_proactive_refresh(shutdown);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.session().access_token().await.unwrap(), "access-2");

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher did not stop")
            .unwrap();
    }

    #[test]
    fn test_is_auth_endpoint() {
        assert!(is_auth_endpoint("/api/auth/login"));
        assert!(is_auth_endpoint("/api/auth/refresh?x=1"));
        assert!(!is_auth_endpoint("/api/auth/profile"));
    }

    #[test]
    fn test_refresh_delay_at_eighty_percent() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"iat":1000,"exp":2000}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(refresh_delay(&token, 0.8, 1000), Some(Duration::from_secs(800)));
        assert_eq!(refresh_delay(&token, 0.8, 1900), Some(Duration::ZERO));
        assert_eq!(refresh_delay("opaque", 0.8, 0), None);
    }
}
