use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use taskgate_core::{AppError, AppResult, UserId, UserIdentity};
use taskgate_domain::{Permission, Role, RoleAssignment, RoleId, SystemRole};
use tracing::{debug, info};

use crate::security_admin_ports::{CreateRoleInput, UpdateRoleInput, UserAccount};
use crate::{AuthorizationService, RoleAssignmentRepository, RoleRepository, UserDirectory};

/// Application service for role and assignment administration.
#[derive(Clone)]
pub struct SecurityAdminService {
    authorization_service: AuthorizationService,
    roles: Arc<dyn RoleRepository>,
    assignments: Arc<dyn RoleAssignmentRepository>,
    users: Arc<dyn UserDirectory>,
}

impl SecurityAdminService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        roles: Arc<dyn RoleRepository>,
        assignments: Arc<dyn RoleAssignmentRepository>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            authorization_service,
            roles,
            assignments,
            users,
        }
    }

    /// Creates missing system roles. Existing ones are left untouched.
    pub async fn seed_system_roles(&self) -> AppResult<usize> {
        let mut created = 0;
        for system_role in SystemRole::all() {
            if self
                .roles
                .find_role_by_name(system_role.name())
                .await?
                .is_some()
            {
                continue;
            }

            match self.roles.insert_role(system_role.to_role()?).await {
                Ok(()) => created += 1,
                // Another instance seeded the role first.
                Err(AppError::Conflict(_)) => {}
                Err(error) => return Err(error),
            }
        }

        if created > 0 {
            info!(created, "seeded system roles");
        }

        Ok(created)
    }

    /// Returns all roles.
    pub async fn list_roles(&self, actor: &UserIdentity) -> AppResult<Vec<Role>> {
        self.require_role_manage_permission(actor).await?;

        let mut roles = self.roles.list_roles().await?;
        roles.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(roles)
    }

    /// Creates a custom role.
    pub async fn create_role(&self, actor: &UserIdentity, input: CreateRoleInput) -> AppResult<Role> {
        self.require_role_manage_permission(actor).await?;

        let permissions = parse_permission_keys(&input.permissions)?;
        let role = Role::new(input.name, input.description, permissions)?;
        self.roles.insert_role(role.clone()).await?;

        info!(
            actor = %actor.user_id(),
            role_id = %role.id(),
            role_name = role.name(),
            "created role"
        );

        Ok(role)
    }

    /// Updates role attributes. System roles keep their names.
    pub async fn update_role(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        input: UpdateRoleInput,
    ) -> AppResult<Role> {
        self.require_role_manage_permission(actor).await?;

        let permissions = input
            .permissions
            .as_deref()
            .map(parse_permission_keys)
            .transpose()?;

        let mut role = self.load_role(role_id).await?;
        if let Some(name) = input.name {
            role.rename(name)?;
        }
        if let Some(description) = input.description {
            role.set_description(Some(description));
        }
        if let Some(permissions) = permissions {
            role.replace_permissions(permissions);
        }

        self.roles.update_role(role.clone()).await?;
        info!(actor = %actor.user_id(), role_id = %role_id, "updated role");

        Ok(role)
    }

    /// Replaces the whole permission set of a role.
    pub async fn replace_role_permissions(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        permission_keys: &[String],
    ) -> AppResult<Role> {
        self.require_role_manage_permission(actor).await?;

        let permissions = parse_permission_keys(permission_keys)?;
        let mut role = self.load_role(role_id).await?;
        role.replace_permissions(permissions);
        self.roles.update_role(role.clone()).await?;

        info!(
            actor = %actor.user_id(),
            role_id = %role_id,
            permission_count = role.permissions().len(),
            "replaced role permissions"
        );

        Ok(role)
    }

    /// Deletes a custom role together with its assignments.
    pub async fn delete_role(&self, actor: &UserIdentity, role_id: RoleId) -> AppResult<()> {
        self.require_role_manage_permission(actor).await?;

        let role = self.load_role(role_id).await?;
        role.ensure_deletable()?;
        self.roles.delete_role(role_id).await?;

        info!(actor = %actor.user_id(), role_id = %role_id, "deleted role");
        Ok(())
    }

    /// Grants a role to a user. Granting an existing assignment is a no-op.
    pub async fn grant_role(
        &self,
        actor: &UserIdentity,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<()> {
        self.require_role_manage_permission(actor).await?;

        self.load_role(role_id).await?;
        if self.users.find_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("user '{user_id}' was not found")));
        }

        let inserted = self
            .assignments
            .grant_role(RoleAssignment {
                user_id,
                role_id,
                assigned_by: Some(actor.user_id()),
                assigned_at: Utc::now(),
            })
            .await?;

        info!(
            actor = %actor.user_id(),
            user_id = %user_id,
            role_id = %role_id,
            inserted,
            "granted role"
        );

        Ok(())
    }

    /// Revokes a role from a user. Revoking a missing assignment is a no-op.
    pub async fn revoke_role(
        &self,
        actor: &UserIdentity,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<()> {
        self.require_role_manage_permission(actor).await?;

        let removed = self.assignments.revoke_role(user_id, role_id).await?;
        info!(
            actor = %actor.user_id(),
            user_id = %user_id,
            role_id = %role_id,
            removed,
            "revoked role"
        );

        Ok(())
    }

    /// Lists all role assignments.
    pub async fn list_role_assignments(
        &self,
        actor: &UserIdentity,
    ) -> AppResult<Vec<RoleAssignment>> {
        self.require_role_manage_permission(actor).await?;
        self.assignments.list_assignments().await
    }

    /// Lists roles of a user. Users may always read their own roles.
    pub async fn user_roles(&self, actor: &UserIdentity, user_id: UserId) -> AppResult<Vec<Role>> {
        if actor.user_id() != user_id {
            self.require_role_manage_permission(actor).await?;
        }

        self.authorization_service.user_roles(user_id).await
    }

    /// Removes every assignment of a user that is being deleted.
    pub async fn remove_user_assignments(
        &self,
        actor: &UserIdentity,
        user_id: UserId,
    ) -> AppResult<u64> {
        self.authorization_service
            .require_permission(actor, Permission::ManageUsers)
            .await?;

        let removed = self.assignments.revoke_all_for_user(user_id).await?;
        info!(actor = %actor.user_id(), user_id = %user_id, removed, "removed user assignments");

        Ok(removed)
    }

    /// Mirrors an authenticated identity into the user store so it can receive grants.
    pub async fn sync_user(&self, identity: &UserIdentity) -> AppResult<()> {
        let account = UserAccount::from(identity);
        if self.users.find_user(identity.user_id()).await?.as_ref() == Some(&account) {
            return Ok(());
        }

        self.users.upsert_user(account).await?;
        debug!(user_id = %identity.user_id(), "synchronized user account");
        Ok(())
    }

    async fn load_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.roles
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))
    }

    async fn require_role_manage_permission(&self, actor: &UserIdentity) -> AppResult<()> {
        self.authorization_service
            .require_permission(actor, Permission::ManageRoles)
            .await
    }
}

fn parse_permission_keys(keys: &[String]) -> AppResult<BTreeSet<Permission>> {
    keys.iter()
        .map(|key| Permission::from_str(key.trim()))
        .collect()
}

#[cfg(test)]
mod tests;
