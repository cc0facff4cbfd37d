//! Convenience result type alias for UIForge.

use crate::error::AppError;

/// A specialized `Result` type for UIForge operations.
pub type AppResult<T> = Result<T, AppError>;
