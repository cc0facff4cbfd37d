//! RBAC helpers for role-based route guarding.

use uiforge_core::error::AppError;
use uiforge_entity::user::UserRole;

use crate::extractors::AuthUser;
use crate::state::AppState;

/// Checks that the caller is a verified administrator.
pub fn require_admin(state: &AppState, auth: &AuthUser) -> Result<(), AppError> {
    state.rbac.require_admin(auth.role, &auth.email)
}

/// Checks that the caller holds one of `allowed`.
pub fn require_roles(
    state: &AppState,
    auth: &AuthUser,
    allowed: &[UserRole],
) -> Result<(), AppError> {
    state.rbac.require_any_role(auth.role, &auth.email, allowed)
}
