//! Shared test helpers for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use http::header::CONTENT_TYPE;
use http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use uiforge_auth::{Claims, JwtEncoder, PasswordHasher, TokenType};
use uiforge_client::{
    ApiRequest, ApiResponse, AuthClient, ClientError, ClientResult, HttpTransport, KeyValueStorage,
    MemoryStorage,
    SessionStore, TokenRefreshCoordinator,
};
use uiforge_core::config::{AppConfig, ClientConfig};
use uiforge_database::{MemoryUserRepository, UserRepository};
use uiforge_entity::user::{CreateUser, User, UserRole};

/// Password of every seeded account.
pub const PASSWORD: &str = "vK7#pQ2!xLm9$wRz";
/// Allowlisted administrator.
pub const ADMIN_EMAIL: &str = "admin@example.com";
/// Regular user.
pub const USER_EMAIL: &str = "dev@example.com";
/// Operator fallback password from the default config.
pub const FALLBACK_PASSWORD: &str = "Operator!Fallback2024";

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// User store, with its outage switch
    pub users: MemoryUserRepository,
    /// Application config
    pub config: AppConfig,
}

impl TestApp {
    /// Create a new test application with a seeded admin and user.
    pub async fn new() -> Self {
        Self::with_config(Self::test_config()).await
    }

    /// Default config with a fixed secret.
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "integration-test-secret".to_string();
        config
    }

    /// Create a test application from `config`.
    pub async fn with_config(config: AppConfig) -> Self {
        let users = MemoryUserRepository::new();
        let state = uiforge_api::build_state(config.clone(), Arc::new(users.clone()))
            .expect("Failed to build state");
        let router = uiforge_api::build_router(state);

        let app = Self {
            router,
            users,
            config,
        };
        app.seed(ADMIN_EMAIL, UserRole::Admin).await;
        app.seed(USER_EMAIL, UserRole::User).await;
        app
    }

    /// Create a user with [`PASSWORD`].
    pub async fn seed(&self, email: &str, role: UserRole) -> User {
        let hasher = PasswordHasher::new();
        self.users
            .create(&CreateUser {
                email: email.to_string(),
                password_hash: hasher.hash_password(PASSWORD).expect("hash"),
                display_name: None,
                role,
            })
            .await
            .expect("Failed to seed user")
    }

    /// Make a GET request
    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().uri(path).method("GET");
        if let Some(t) = token {
            req = req.header("Authorization", format!("Bearer {t}"));
        }
        self.send(req.body(Body::empty()).expect("request")).await
    }

    /// Make a POST request with a JSON body
    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .uri(path)
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("json")))
            .expect("request");
        self.send(req).await
    }

    /// Send a raw request; returns status and JSON body (`Null` when empty).
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(req).await;
        (status, body)
    }

    /// Send a raw request; returns status, headers and JSON body.
    pub async fn send_raw(&self, req: Request<Body>) -> (StatusCode, http::HeaderMap, Value) {
        let response = self.router.clone().oneshot(req).await.expect("router");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    /// Login and return the response body.
    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Mint an access token for `body.user` that expired a minute ago.
    pub fn expired_access_token(&self, login_body: &Value) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: login_body["user"]["id"].as_str().expect("id").to_string(),
            email: login_body["user"]["email"].as_str().expect("email").to_string(),
            role: serde_json::from_value(login_body["user"]["role"].clone()).expect("role"),
            sid: login_body["sessionId"].as_str().unwrap_or_default().to_string(),
            iat: now - 960,
            exp: now - 60,
            jti: uuid::Uuid::new_v4().to_string(),
            token_type: TokenType::Access,
        };
        JwtEncoder::new(&self.config.auth)
            .encode_claims(&claims)
            .expect("encode")
    }

    /// A client whose transport dispatches straight into the router.
    pub fn client(&self) -> (AuthClient, RouterTransport) {
        self.client_with_storage(Arc::new(MemoryStorage::new()))
    }

    /// Like [`Self::client`], persisting into `storage`.
    pub fn client_with_storage(&self, storage: Arc<dyn KeyValueStorage>) -> (AuthClient, RouterTransport) {
        let transport = RouterTransport::new(self.router.clone());
        let session = Arc::new(SessionStore::new(storage));
        let coordinator = Arc::new(TokenRefreshCoordinator::new(
            &ClientConfig::default(),
            Arc::new(transport.clone()),
            session,
        ));
        (AuthClient::new(coordinator), transport)
    }
}

/// [`HttpTransport`] that calls the axum router in-process and records paths.
#[derive(Debug, Clone)]
pub struct RouterTransport {
    router: Router,
    paths: Arc<Mutex<Vec<String>>>,
}

impl RouterTransport {
    /// Wraps `router`.
    pub fn new(router: Router) -> Self {
        Self {
            router,
            paths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// How many requests hit `path`.
    pub fn count(&self, path: &str) -> usize {
        self.paths
            .lock()
            .expect("lock")
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for RouterTransport {
    async fn send(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        self.paths
            .lock()
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .push(request.route().to_string());

        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(&request.path);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let body = match &request.body {
            Some(json) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(json)?)
            }
            None => Body::empty(),
        };
        let req = builder
            .body(body)
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
