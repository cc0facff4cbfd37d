//! RBAC enforcement logic: checks whether a caller satisfies a role requirement.

use uiforge_core::error::AppError;
use uiforge_entity::user::UserRole;

use crate::admin::AdminIdentityVerifier;

/// Enforces role requirements for server-side operations.
///
/// The admin role is only honored for callers the
/// [`AdminIdentityVerifier`] accepts.
#[derive(Debug, Clone)]
pub struct RbacEnforcer {
    /// The single admin authority.
    verifier: AdminIdentityVerifier,
}

impl RbacEnforcer {
    /// Creates an enforcer around the given admin verifier.
    pub fn new(verifier: AdminIdentityVerifier) -> Self {
        Self { verifier }
    }

    /// Returns the admin verifier.
    pub fn verifier(&self) -> &AdminIdentityVerifier {
        &self.verifier
    }

    /// Checks that the caller holds one of the allowed roles.
    ///
    /// Returns `Ok(())` if allowed, or a `Forbidden` error if denied.
    pub fn require_any_role(
        &self,
        role: UserRole,
        email: &str,
        allowed: &[UserRole],
    ) -> Result<(), AppError> {
        if !allowed.contains(&role) {
            return Err(AppError::forbidden(format!(
                "Role '{role}' is not permitted for this operation"
            )));
        }
        if role == UserRole::Admin && !self.verifier.check(role, email) {
            return Err(AppError::forbidden("Administrator identity not verified"));
        }
        Ok(())
    }

    /// Checks that the caller is a verified administrator.
    pub fn require_admin(&self, role: UserRole, email: &str) -> Result<(), AppError> {
        if self.verifier.check(role, email) {
            Ok(())
        } else {
            Err(AppError::forbidden("Admin access required"))
        }
    }
}
