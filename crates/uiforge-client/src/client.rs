//! High-level auth operations for the client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use uiforge_core::config::ClientConfig;
use uiforge_entity::user::UserSnapshot;

use crate::coordinator::{LOGIN_PATH, SIGNUP_PATH, TokenRefreshCoordinator};
use crate::error::{ClientError, ClientResult};
use crate::gate::ProfileSource;
use crate::session::{Session, SessionStore, TokenSet};
use crate::storage::{FileStorage, KeyValueStorage, MemoryStorage};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};

/// Profile endpoint.
pub const PROFILE_PATH: &str = "/api/auth/profile";
/// Logout endpoint.
pub const LOGOUT_PATH: &str = "/api/auth/logout";

/// Signup form.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    /// Email.
    pub email: String,
    /// Password.
    pub password: String,
    /// Optional display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Terms of service acceptance.
    pub terms_accepted: bool,
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("email", &self.email)
            .field("terms_accepted", &self.terms_accepted)
            .finish()
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthBody {
    user: UserSnapshot,
    access_token: String,
    refresh_token: String,
    session_id: String,
}

/// `GET /api/auth/profile` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    /// Current user record.
    pub user: UserSnapshot,
    /// Server-side verified-admin flag.
    pub is_admin: bool,
}

/// Login, signup, logout and profile over a shared session.
#[derive(Debug, Clone)]
pub struct AuthClient {
    coordinator: Arc<TokenRefreshCoordinator>,
    session: Arc<SessionStore>,
}

impl AuthClient {
    /// Creates a client over an existing coordinator.
    pub fn new(coordinator: Arc<TokenRefreshCoordinator>) -> Self {
        let session = Arc::clone(coordinator.session());
        Self {
            coordinator,
            session,
        }
    }

    /// Wires storage, session, reqwest transport and coordinator from config.
    pub fn from_config(config: &ClientConfig) -> Self {
        let storage: Arc<dyn KeyValueStorage> = match &config.storage_path {
            Some(path) => Arc::new(FileStorage::new(path)),
            None => Arc::new(MemoryStorage::new()),
        };
        let session = Arc::new(SessionStore::new(storage));
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config.base_url));
        Self::new(Arc::new(TokenRefreshCoordinator::new(config, transport, session)))
    }

    /// The shared session.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// The request coordinator.
    pub fn coordinator(&self) -> &Arc<TokenRefreshCoordinator> {
        &self.coordinator
    }

    /// Starts refreshing tokens ahead of expiry until `shutdown` turns `true`.
    pub fn start_proactive_refresh(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        self.coordinator.spawn_proactive_refresh(shutdown)
    }

    /// Loads a previously persisted session.
    pub async fn restore(&self) -> ClientResult<Option<Session>> {
        self.session.restore().await
    }

    /// Logs in and persists the resulting session.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Session> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginBody { email, password })?;
        let response = self.coordinator.execute(request).await?;
        let session = self.establish(&response).await?;
        info!(user_id = %session.user.id, "Logged in");
        Ok(session)
    }

    /// Signs up and persists the resulting session.
    pub async fn signup(&self, form: &SignupForm) -> ClientResult<Session> {
        let request = ApiRequest::post(SIGNUP_PATH).json(form)?;
        let response = self.coordinator.execute(request).await?;
        let session = self.establish(&response).await?;
        info!(user_id = %session.user.id, "Signed up");
        Ok(session)
    }

    /// Clears the local session, then tells the server to expire cookies.
    ///
    /// The local clear always happens; the server call is best-effort.
    pub async fn logout(&self) -> ClientResult<()> {
        self.session.clear().await?;
        if let Err(e) = self.coordinator.execute(ApiRequest::post(LOGOUT_PATH)).await {
            debug!(error = %e, "Server logout failed");
        }
        info!("Logged out");
        Ok(())
    }

    /// Fetches the current profile and stores it in the session.
    pub async fn fetch_profile(&self) -> ClientResult<ProfileResponse> {
        let epoch = self.session.epoch().await;
        let response = self.coordinator.execute(ApiRequest::get(PROFILE_PATH)).await?;
        let profile: ProfileResponse = response.json()?;
        if !self.session.attach_profile(epoch, profile.user.clone()).await? {
            return Err(ClientError::SessionExpired);
        }
        Ok(profile)
    }

    /// Sends an arbitrary API request through the coordinator.
    pub async fn request(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        self.coordinator.execute(request).await
    }

    async fn establish(&self, response: &ApiResponse) -> ClientResult<Session> {
        let body: AuthBody = response.json()?;
        let session = Session {
            tokens: TokenSet {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
            },
            user: body.user,
            session_id: body.session_id,
        };
        self.session.persist(session.clone()).await?;
        Ok(session)
    }
}

#[async_trait]
impl ProfileSource for AuthClient {
    async fn fetch_profile(&self) -> ClientResult<UserSnapshot> {
        AuthClient::fetch_profile(self).await.map(|p| p.user)
    }
}
