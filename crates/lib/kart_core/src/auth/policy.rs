//! Ownership-based authorization.

use tracing::debug;

use super::AuthError;
use crate::models::auth::Identity;

/// Decide whether `identity` may read or mutate a resource owned by
/// `target_owner_id`.
///
/// Admins are always allowed. Everyone else must name an owner, and it must
/// be themselves. `Some(0)` is an owner like any other.
pub fn can_access(identity: &Identity, target_owner_id: Option<i64>) -> Result<(), AuthError> {
    if identity.role.is_admin() {
        return Ok(());
    }
    match target_owner_id {
        Some(owner) if owner == identity.user_id => Ok(()),
        Some(owner) => {
            debug!(user_id = identity.user_id, owner, "ownership check denied");
            Err(AuthError::Forbidden)
        }
        None => {
            debug!(user_id = identity.user_id, "ownership check denied: no owner named");
            Err(AuthError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;

    fn identity(user_id: i64, role: Role) -> Identity {
        Identity {
            user_id,
            role,
            username: "someone".into(),
        }
    }

    #[test]
    fn admin_is_allowed_for_any_owner() {
        let admin = identity(1, Role::Admin);
        assert!(can_access(&admin, Some(1)).is_ok());
        assert!(can_access(&admin, Some(99)).is_ok());
        assert!(can_access(&admin, Some(0)).is_ok());
        assert!(can_access(&admin, None).is_ok());
    }

    #[test]
    fn user_is_allowed_only_for_self() {
        let user = identity(5, Role::User);
        assert!(can_access(&user, Some(5)).is_ok());
        assert!(matches!(can_access(&user, Some(6)), Err(AuthError::Forbidden)));
        assert!(matches!(can_access(&user, None), Err(AuthError::Forbidden)));
    }

    #[test]
    fn zero_owner_is_compared_not_skipped() {
        assert!(matches!(
            can_access(&identity(5, Role::User), Some(0)),
            Err(AuthError::Forbidden)
        ));
        assert!(can_access(&identity(0, Role::User), Some(0)).is_ok());
        assert!(matches!(
            can_access(&identity(0, Role::User), None),
            Err(AuthError::Forbidden)
        ));
    }
}
