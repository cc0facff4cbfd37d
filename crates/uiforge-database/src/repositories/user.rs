//! User repository trait and PostgreSQL implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use uiforge_core::error::{AppError, ErrorKind};
use uiforge_core::result::AppResult;
use uiforge_entity::user::{CreateUser, User};

/// Lookup and creation of user records.
///
/// Implementations must report an unreachable store as
/// [`ErrorKind::BackendUnavailable`]; the credential store keys its fallback
/// policy off that kind.
#[async_trait]
pub trait UserRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Find a user by email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Find a user by identifier.
    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>>;

    /// Create a user. Duplicate emails fail with [`ErrorKind::EmailTaken`].
    async fn create(&self, data: &CreateUser) -> AppResult<User>;
}

/// PostgreSQL-backed user repository.
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Failed to find user by email"))
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "Failed to find user by id"))
    }

    async fn create(&self, data: &CreateUser) -> AppResult<User> {
        let now = Utc::now();
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash, display_name, role, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6) RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&data.email)
        .bind(&data.password_hash)
        .bind(&data.display_name)
        .bind(data.role)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "Failed to create user"))
    }
}

/// Classify a sqlx error into the application taxonomy.
///
/// Connection-level failures become `BackendUnavailable`; unique
/// violations become `EmailTaken` (email is the only unique column).
fn map_sqlx_error(err: sqlx::Error, context: &str) -> AppError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => AppError::with_source(
            ErrorKind::BackendUnavailable,
            format!("{context}: user store unreachable"),
            err,
        ),
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::email_taken(),
        _ => AppError::with_source(ErrorKind::Database, context.to_string(), err),
    }
}
