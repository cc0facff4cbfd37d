//! In-memory user repository using dashmap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use uiforge_core::error::AppError;
use uiforge_core::result::AppResult;
use uiforge_entity::user::{CreateUser, User};

use super::user::UserRepository;

/// In-memory user store for tests and local development.
///
/// [`MemoryUserRepository::set_available`] simulates an outage: while
/// unavailable every call fails with `BackendUnavailable`.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserRepository {
    /// Users keyed by id.
    users: Arc<DashMap<String, User>>,
    /// Lowercased email → id.
    emails: Arc<DashMap<String, String>>,
    /// Set while the store is simulated as down.
    unavailable: Arc<AtomicBool>,
}

impl MemoryUserRepository {
    /// Create an empty, available repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated availability.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
        debug!(available, "Memory user store availability changed");
    }

    /// Insert a fully-formed record, replacing any with the same id.
    pub fn insert(&self, user: User) {
        self.emails.insert(user.email.to_lowercase(), user.id.clone());
        self.users.insert(user.id.clone(), user);
    }

    /// Flip the active flag of a user. Returns `false` if the id is unknown.
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        match self.users.get_mut(id) {
            Some(mut user) => {
                user.is_active = active;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::backend_unavailable("User store unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.ensure_available()?;
        let Some(id) = self.emails.get(&email.to_lowercase()).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        self.ensure_available()?;
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn create(&self, data: &CreateUser) -> AppResult<User> {
        self.ensure_available()?;
        let key = data.email.to_lowercase();
        let id = Uuid::new_v4().to_string();

        // The entry API keeps check-and-insert atomic per email.
        match self.emails.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(AppError::email_taken()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let now = Utc::now();
        let user = User {
            id: id.clone(),
            email: data.email.clone(),
            password_hash: data.password_hash.clone(),
            display_name: data.display_name.clone(),
            role: data.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }
}
