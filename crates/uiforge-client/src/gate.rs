//! Route gating by session state and verified role.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use uiforge_auth::AdminIdentityVerifier;
use uiforge_entity::user::{UserRole, UserSnapshot};

use crate::error::ClientResult;
use crate::session::{SessionStatus, SessionStore};

/// Gate view of the session.
pub type GateState = SessionStatus;

/// Something that can fetch (and record) the current profile.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetches the profile for the current session.
    async fn fetch_profile(&self) -> ClientResult<UserSnapshot>;
}

/// What a route demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRequirement {
    /// Anyone.
    Public,
    /// Any authenticated user.
    Authenticated,
    /// An authenticated user holding one of these roles.
    Roles(Vec<UserRole>),
    /// A verified administrator.
    Admin,
}

/// Gate decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Render the route.
    Allow,
    /// Send the user to login, then back to `return_to`.
    RedirectToLogin {
        /// Local path to resume after login.
        return_to: String,
    },
    /// Logged in, but not allowed here.
    InsufficientRole,
}

/// Decides whether a destination may be rendered.
pub struct RouteGate {
    session: Arc<SessionStore>,
    profiles: Arc<dyn ProfileSource>,
    verifier: AdminIdentityVerifier,
}

impl std::fmt::Debug for RouteGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGate")
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl RouteGate {
    /// Creates a gate.
    pub fn new(
        session: Arc<SessionStore>,
        profiles: Arc<dyn ProfileSource>,
        verifier: AdminIdentityVerifier,
    ) -> Self {
        Self {
            session,
            profiles,
            verifier,
        }
    }

    /// Current gate state.
    pub async fn state(&self) -> GateState {
        self.session.status().await
    }

    /// Checks `requirement` for navigation to `destination`.
    pub async fn check(&self, requirement: &RouteRequirement, destination: &str) -> GateOutcome {
        if *requirement == RouteRequirement::Public {
            return GateOutcome::Allow;
        }

        let Some(user) = self.resolve_user().await else {
            return GateOutcome::RedirectToLogin {
                return_to: sanitize_return_to(destination),
            };
        };

        let allowed = match requirement {
            RouteRequirement::Public | RouteRequirement::Authenticated => true,
            RouteRequirement::Roles(roles) => {
                roles.contains(&user.role)
                    && (user.role != UserRole::Admin || self.verifier.is_verified_admin(&user))
            }
            RouteRequirement::Admin => self.verifier.is_verified_admin(&user),
        };

        if allowed {
            GateOutcome::Allow
        } else {
            debug!(user_id = %user.id, ?requirement, "Route denied");
            GateOutcome::InsufficientRole
        }
    }

    async fn resolve_user(&self) -> Option<UserSnapshot> {
        match self.session.status().await {
            SessionStatus::Unauthenticated => None,
            SessionStatus::Authenticated => self.session.user().await,
            SessionStatus::AuthenticatedNoProfile => match self.profiles.fetch_profile().await {
                Ok(user) => Some(user),
                Err(e) => {
                    debug!(error = %e, "Profile fetch failed, clearing session");
                    if let Err(e) = self.session.clear().await {
                        warn!(error = %e, "Failed to clear session");
                    }
                    None
                }
            },
        }
    }
}

/// Keeps only local absolute paths; anything else resumes at `/`.
fn sanitize_return_to(destination: &str) -> String {
    if destination.starts_with('/') && !destination.starts_with("//") && !destination.contains('\\') {
        destination.to_string()
    } else {
        "/".to_string()
    }
}
