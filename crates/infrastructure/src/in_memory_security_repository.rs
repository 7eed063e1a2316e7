use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use taskgate_application::{
    RoleAssignmentRepository, RoleRepository, UserAccount, UserDirectory,
};
use taskgate_core::{AppError, AppResult, UserId};
use taskgate_domain::{Role, RoleAssignment, RoleId};

#[derive(Debug, Default)]
struct SecurityTables {
    roles: HashMap<RoleId, Role>,
    assignments: BTreeMap<(UserId, RoleId), RoleAssignment>,
    users: HashMap<UserId, UserAccount>,
}

/// In-memory role, assignment and user store.
///
/// All three tables sit behind one lock so role deletion cascades atomically.
#[derive(Debug, Default)]
pub struct InMemorySecurityRepository {
    tables: RwLock<SecurityTables>,
}

impl InMemorySecurityRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn name_conflict(name: &str) -> AppError {
    AppError::Conflict(format!("role '{name}' already exists"))
}

#[async_trait]
impl RoleRepository for InMemorySecurityRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.tables.read().await.roles.values().cloned().collect();
        roles.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(roles)
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .tables
            .read()
            .await
            .roles
            .values()
            .find(|role| role.name() == name)
            .cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.roles.values().any(|stored| stored.name() == role.name()) {
            return Err(name_conflict(role.name()));
        }

        tables.roles.insert(role.id(), role);
        Ok(())
    }

    async fn update_role(&self, role: Role) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&role.id()) {
            return Err(AppError::NotFound(format!(
                "role '{}' was not found",
                role.id()
            )));
        }
        if tables
            .roles
            .values()
            .any(|stored| stored.name() == role.name() && stored.id() != role.id())
        {
            return Err(name_conflict(role.name()));
        }

        tables.roles.insert(role.id(), role);
        Ok(())
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.roles.remove(&role_id);
        tables
            .assignments
            .retain(|(_, assigned_role_id), _| *assigned_role_id != role_id);
        Ok(())
    }
}

#[async_trait]
impl RoleAssignmentRepository for InMemorySecurityRepository {
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<Role>> {
        let tables = self.tables.read().await;

        Ok(tables
            .assignments
            .keys()
            .filter(|(assigned_user_id, _)| *assigned_user_id == user_id)
            .filter_map(|(_, role_id)| tables.roles.get(role_id).cloned())
            .collect())
    }

    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .tables
            .read()
            .await
            .assignments
            .values()
            .cloned()
            .collect())
    }

    async fn grant_role(&self, assignment: RoleAssignment) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&assignment.role_id) {
            return Err(AppError::NotFound(format!(
                "role '{}' was not found",
                assignment.role_id
            )));
        }

        let key = (assignment.user_id, assignment.role_id);
        if tables.assignments.contains_key(&key) {
            return Ok(false);
        }

        tables.assignments.insert(key, assignment);
        Ok(true)
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> AppResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .assignments
            .remove(&(user_id, role_id))
            .is_some())
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.assignments.len();
        tables
            .assignments
            .retain(|(assigned_user_id, _), _| *assigned_user_id != user_id);

        Ok(u64::try_from(before - tables.assignments.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl UserDirectory for InMemorySecurityRepository {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn upsert_user(&self, user: UserAccount) -> AppResult<()> {
        self.tables.write().await.users.insert(user.user_id, user);
        Ok(())
    }
}
