use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use taskgate_core::{AppError, AppResult, LegacyRole, UserId, UserIdentity};
use taskgate_domain::{Permission, Role};
use tracing::debug;

use crate::{LegacyRolePermissions, RoleAssignmentRepository, UserDirectory};

/// Resolves effective permissions from role assignments and the legacy role.
#[derive(Clone)]
pub struct AuthorizationService {
    assignments: Arc<dyn RoleAssignmentRepository>,
    users: Arc<dyn UserDirectory>,
    legacy_roles: Arc<dyn LegacyRolePermissions>,
}

impl AuthorizationService {
    /// Creates a new authorization service from its ports.
    #[must_use]
    pub fn new(
        assignments: Arc<dyn RoleAssignmentRepository>,
        users: Arc<dyn UserDirectory>,
        legacy_roles: Arc<dyn LegacyRolePermissions>,
    ) -> Self {
        Self {
            assignments,
            users,
            legacy_roles,
        }
    }

    /// Returns whether a user holds a permission identified by its catalog key.
    ///
    /// Missing users and keys unknown to the catalog evaluate to `false`.
    pub async fn has_permission(&self, user_id: UserId, key: &str) -> AppResult<bool> {
        let Ok(permission) = Permission::from_str(key) else {
            debug!(user_id = %user_id, key, "permission key is not in the catalog");
            return Ok(false);
        };

        Ok(self
            .effective_permissions(user_id)
            .await?
            .contains(&permission))
    }

    /// Returns the effective permission set of a stored user.
    ///
    /// A missing user resolves to the empty set.
    pub async fn effective_permissions(&self, user_id: UserId) -> AppResult<BTreeSet<Permission>> {
        let Some(user) = self.users.find_user(user_id).await? else {
            return Ok(BTreeSet::new());
        };

        self.resolve_permissions(user.user_id, user.legacy_role)
            .await
    }

    /// Returns the effective permission set of an authenticated actor.
    pub async fn actor_permissions(&self, actor: &UserIdentity) -> AppResult<BTreeSet<Permission>> {
        self.resolve_permissions(actor.user_id(), actor.legacy_role())
            .await
    }

    /// Ensures an actor holds the required permission.
    pub async fn require_permission(
        &self,
        actor: &UserIdentity,
        permission: Permission,
    ) -> AppResult<()> {
        let permissions = self.actor_permissions(actor).await?;
        ensure_granted(actor, &permissions, permission)
    }

    /// Returns the roles assigned to a user, ordered by name.
    pub async fn user_roles(&self, user_id: UserId) -> AppResult<Vec<Role>> {
        let mut roles = self.assignments.list_roles_for_user(user_id).await?;
        roles.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(roles)
    }

    async fn resolve_permissions(
        &self,
        user_id: UserId,
        legacy_role: LegacyRole,
    ) -> AppResult<BTreeSet<Permission>> {
        let mut permissions = self.legacy_roles.permissions_for(legacy_role);

        for role in self.assignments.list_roles_for_user(user_id).await? {
            permissions.extend(role.permissions().iter().copied());
        }

        Ok(permissions)
    }
}

/// Fails with `Forbidden` unless the resolved set contains the permission.
pub(crate) fn ensure_granted(
    actor: &UserIdentity,
    permissions: &BTreeSet<Permission>,
    permission: Permission,
) -> AppResult<()> {
    if permissions.contains(&permission) {
        return Ok(());
    }

    Err(AppError::Forbidden(format!(
        "user '{}' is missing permission '{}'",
        actor.email(),
        permission.as_str()
    )))
}
