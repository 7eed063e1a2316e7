use async_trait::async_trait;

use taskgate_core::{AppResult, LegacyRole, TenantId, UserId, UserIdentity};
use taskgate_domain::{Role, RoleAssignment, RoleId};

/// Input payload for creating custom roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Catalog keys to grant.
    pub permissions: Vec<String>,
}

/// Input payload for updating role attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRoleInput {
    /// New name, rejected for system roles.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Whole replacement permission set.
    pub permissions: Option<Vec<String>>,
}

/// User projection consumed from the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    /// User identifier.
    pub user_id: UserId,
    /// User email.
    pub email: String,
    /// Coarse legacy classification.
    pub legacy_role: LegacyRole,
    /// Home tenant.
    pub tenant_id: TenantId,
}

/// Repository port for role definitions.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists all roles ordered by name.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Finds a role by identifier.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds a role by its unique name.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Inserts a role. Fails with `Conflict` when the name is taken.
    async fn insert_role(&self, role: Role) -> AppResult<()>;

    /// Persists name, description and the whole permission set of a role.
    async fn update_role(&self, role: Role) -> AppResult<()>;

    /// Deletes a role and every assignment that references it.
    async fn delete_role(&self, role_id: RoleId) -> AppResult<()>;
}

/// Repository port for user-role assignments.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Lists roles assigned to a user.
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<Role>>;

    /// Lists all assignments.
    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>>;

    /// Stores an assignment. Returns `false` when it already existed.
    async fn grant_role(&self, assignment: RoleAssignment) -> AppResult<bool>;

    /// Removes an assignment. Returns `false` when none existed.
    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> AppResult<bool>;

    /// Removes every assignment of a user.
    async fn revoke_all_for_user(&self, user_id: UserId) -> AppResult<u64>;
}

/// Port onto the user store mirrored from the identity provider.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user account.
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>>;

    /// Inserts or refreshes a user account.
    async fn upsert_user(&self, user: UserAccount) -> AppResult<()>;
}

impl From<&UserIdentity> for UserAccount {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            user_id: identity.user_id(),
            email: identity.email().to_owned(),
            legacy_role: identity.legacy_role(),
            tenant_id: identity.tenant_id(),
        }
    }
}
