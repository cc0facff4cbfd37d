//! The client's persisted session.
//!
//! A session is stored under four fixed keys and always written or removed
//! as one batch. The stored [`UserSnapshot`] is the identity source after a
//! reload; token claims are never used to rebuild it.
//!
//! Every `persist` and `clear` bumps the session *epoch*. A refresh reads
//! the epoch before going to the network and hands it back to
//! [`SessionStore::replace_tokens`], which drops the result if the epoch
//! moved in the meantime. That is how logout wins over an in-flight refresh.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use uiforge_entity::user::UserSnapshot;

use crate::error::{ClientError, ClientResult};
use crate::storage::{KeyValueStorage, StorageOp};

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "uiforge.access_token";
/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "uiforge.refresh_token";
/// Storage key for the JSON user snapshot.
pub const USER_KEY: &str = "uiforge.user";
/// Storage key for the session id.
pub const SESSION_ID_KEY: &str = "uiforge.session_id";

const ALL_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY, SESSION_ID_KEY];

/// Access and refresh token strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token exchanged at the refresh endpoint.
    pub refresh_token: String,
}

/// A complete client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Current tokens.
    pub tokens: TokenSet,
    /// Identity as last reported by the server.
    pub user: UserSnapshot,
    /// Server-assigned session id.
    pub session_id: String,
}

/// Coarse session status, as the route gate sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No tokens.
    Unauthenticated,
    /// Tokens but no profile yet.
    AuthenticatedNoProfile,
    /// Tokens and profile.
    Authenticated,
}

/// Tokens together with the epoch they were read under.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    /// Epoch at read time.
    pub epoch: u64,
    /// Tokens at read time.
    pub tokens: TokenSet,
}

#[derive(Debug, Clone, Default)]
enum SessionState {
    #[default]
    Empty,
    TokensOnly {
        tokens: TokenSet,
        session_id: String,
    },
    Active(Session),
}

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    epoch: u64,
}

/// Owner of the session; shared as `Arc<SessionStore>`.
#[derive(Debug)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    inner: RwLock<Inner>,
    revision: watch::Sender<u64>,
}

impl SessionStore {
    /// Creates an empty store over `storage`. Call [`Self::restore`] to load.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            storage,
            inner: RwLock::new(Inner::default()),
            revision,
        }
    }

    /// Receiver that changes whenever the session changes in any way.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn notify(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    /// Writes a full session in one batch and makes it current.
    pub async fn persist(&self, session: Session) -> ClientResult<()> {
        let mut inner = self.inner.write().await;
        self.storage.apply(session_ops(&session)?).await?;
        inner.state = SessionState::Active(session);
        inner.epoch += 1;
        drop(inner);
        self.notify();
        Ok(())
    }

    /// Loads the stored session.
    ///
    /// A stored snapshot is trusted verbatim. Tokens without a readable
    /// snapshot (or a snapshot without tokens) are cleared.
    pub async fn restore(&self) -> ClientResult<Option<Session>> {
        let access = self.storage.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.storage.get(REFRESH_TOKEN_KEY).await?;
        let user = self.storage.get(USER_KEY).await?;
        let session_id = self.storage.get(SESSION_ID_KEY).await?;

        if access.is_none() && refresh.is_none() && user.is_none() && session_id.is_none() {
            return Ok(None);
        }

        let user: Option<UserSnapshot> = user.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored user snapshot is unreadable");
                None
            }
        });

        match (access, refresh, user) {
            (Some(access_token), Some(refresh_token), Some(user)) => {
                let session = Session {
                    tokens: TokenSet {
                        access_token,
                        refresh_token,
                    },
                    user,
                    session_id: session_id.unwrap_or_default(),
                };
                let mut inner = self.inner.write().await;
                inner.state = SessionState::Active(session.clone());
                inner.epoch += 1;
                drop(inner);
                self.notify();
                debug!(user_id = %session.user.id, "Session restored");
                Ok(Some(session))
            }
            _ => {
                warn!("Incomplete stored session, clearing");
                self.clear().await?;
                Ok(None)
            }
        }
    }

    /// Removes every session key in one batch.
    pub async fn clear(&self) -> ClientResult<()> {
        let mut inner = self.inner.write().await;
        self.storage
            .apply(ALL_KEYS.iter().map(|k| StorageOp::remove(k)).collect())
            .await?;
        inner.state = SessionState::Empty;
        inner.epoch += 1;
        drop(inner);
        self.notify();
        Ok(())
    }

    /// Clears only if nothing replaced the session since `epoch`.
    pub async fn clear_if_current(&self, epoch: u64) -> ClientResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            return Ok(false);
        }
        self.storage
            .apply(ALL_KEYS.iter().map(|k| StorageOp::remove(k)).collect())
            .await?;
        inner.state = SessionState::Empty;
        inner.epoch += 1;
        drop(inner);
        self.notify();
        Ok(true)
    }

    /// Installs refreshed tokens, keeping the snapshot.
    ///
    /// Returns `false`, writing nothing, when the session was cleared or
    /// replaced after `epoch` was read.
    pub async fn replace_tokens(&self, epoch: u64, tokens: TokenSet) -> ClientResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            debug!(expected = epoch, current = inner.epoch, "Discarding stale token refresh");
            return Ok(false);
        }

        match &mut inner.state {
            SessionState::Empty => return Ok(false),
            SessionState::TokensOnly { tokens: current, .. } => *current = tokens,
            SessionState::Active(session) => {
                self.storage
                    .apply(vec![
                        StorageOp::set(ACCESS_TOKEN_KEY, tokens.access_token.clone()),
                        StorageOp::set(REFRESH_TOKEN_KEY, tokens.refresh_token.clone()),
                    ])
                    .await?;
                session.tokens = tokens;
            }
        }
        drop(inner);
        self.notify();
        Ok(true)
    }

    /// Holds tokens in memory until a profile is attached.
    pub async fn adopt_tokens(&self, tokens: TokenSet, session_id: String) {
        let mut inner = self.inner.write().await;
        inner.state = SessionState::TokensOnly { tokens, session_id };
        inner.epoch += 1;
        drop(inner);
        self.notify();
    }

    /// Records a freshly fetched profile and persists the full session.
    ///
    /// Returns `false` when there are no tokens or the epoch moved.
    pub async fn attach_profile(&self, epoch: u64, user: UserSnapshot) -> ClientResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            return Ok(false);
        }

        let session = match &inner.state {
            SessionState::Empty => return Ok(false),
            SessionState::TokensOnly { tokens, session_id } => Session {
                tokens: tokens.clone(),
                user,
                session_id: session_id.clone(),
            },
            SessionState::Active(session) => Session {
                user,
                ..session.clone()
            },
        };

        self.storage.apply(session_ops(&session)?).await?;
        inner.state = SessionState::Active(session);
        drop(inner);
        self.notify();
        Ok(true)
    }

    /// Current epoch.
    pub async fn epoch(&self) -> u64 {
        self.inner.read().await.epoch
    }

    /// Current status.
    pub async fn status(&self) -> SessionStatus {
        match self.inner.read().await.state {
            SessionState::Empty => SessionStatus::Unauthenticated,
            SessionState::TokensOnly { .. } => SessionStatus::AuthenticatedNoProfile,
            SessionState::Active(_) => SessionStatus::Authenticated,
        }
    }

    /// Current full session, if any.
    pub async fn current(&self) -> Option<Session> {
        match &self.inner.read().await.state {
            SessionState::Active(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Current user snapshot, if any.
    pub async fn user(&self) -> Option<UserSnapshot> {
        self.current().await.map(|s| s.user)
    }

    /// Current tokens with the epoch they belong to.
    pub async fn token_snapshot(&self) -> Option<TokenSnapshot> {
        let inner = self.inner.read().await;
        let tokens = match &inner.state {
            SessionState::Empty => return None,
            SessionState::TokensOnly { tokens, .. } => tokens.clone(),
            SessionState::Active(session) => session.tokens.clone(),
        };
        Some(TokenSnapshot {
            epoch: inner.epoch,
            tokens,
        })
    }

    /// Current access token.
    pub async fn access_token(&self) -> Option<String> {
        self.token_snapshot().await.map(|s| s.tokens.access_token)
    }
}

fn session_ops(session: &Session) -> ClientResult<Vec<StorageOp>> {
    let user = serde_json::to_string(&session.user)
        .map_err(|e| ClientError::Storage(format!("Failed to encode user snapshot: {e}")))?;
    Ok(vec![
        StorageOp::set(ACCESS_TOKEN_KEY, session.tokens.access_token.clone()),
        StorageOp::set(REFRESH_TOKEN_KEY, session.tokens.refresh_token.clone()),
        StorageOp::set(USER_KEY, user),
        StorageOp::set(SESSION_ID_KEY, session.session_id.clone()),
    ])
}
