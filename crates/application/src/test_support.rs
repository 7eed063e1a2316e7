use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use taskgate_core::{AppError, AppResult, LegacyRole, TenantId, UserId, UserIdentity};
use taskgate_domain::{
    AuditRecord, Permission, Role, RoleAssignment, RoleId, Task, TaskId, TaskMessage, TrafficLight,
};

use crate::{
    AuditLogQuery, AuditLogRepository, AuditRepository, AuthorizationService,
    LegacyRolePermissions, RoleAssignmentRepository, RoleRepository, SystemRoleLegacyMapping,
    TaskRepository, TaskTransitionWrite, UserAccount, UserDirectory,
};

#[derive(Default)]
pub(crate) struct FakeSecurityStore {
    pub(crate) roles: Mutex<Vec<Role>>,
    pub(crate) assignments: Mutex<Vec<RoleAssignment>>,
    pub(crate) users: Mutex<Vec<UserAccount>>,
}

impl FakeSecurityStore {
    pub(crate) async fn add_user(&self, legacy_role: LegacyRole, tenant_id: TenantId) -> UserIdentity {
        let user_id = UserId::new();
        let email = format!("{user_id}@example.test");
        self.users.lock().await.push(UserAccount {
            user_id,
            email: email.clone(),
            legacy_role,
            tenant_id,
        });

        UserIdentity::new(user_id, email, legacy_role, tenant_id)
    }

    /// Adds a user with one custom role granting `permissions` on top of the legacy set.
    pub(crate) async fn add_user_with_permissions(
        &self,
        legacy_role: LegacyRole,
        tenant_id: TenantId,
        permissions: &[Permission],
    ) -> UserIdentity {
        let identity = self.add_user(legacy_role, tenant_id).await;
        let role = Role::new(
            format!("role-{}", identity.user_id()),
            None,
            permissions.iter().copied(),
        );
        let Ok(role) = role else {
            return identity;
        };

        self.assignments.lock().await.push(RoleAssignment {
            user_id: identity.user_id(),
            role_id: role.id(),
            assigned_by: None,
            assigned_at: chrono::Utc::now(),
        });
        self.roles.lock().await.push(role);

        identity
    }
}

#[async_trait]
impl RoleRepository for FakeSecurityStore {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self.roles.lock().await.clone())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.id() == role_id)
            .cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.name() == name)
            .cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        let mut roles = self.roles.lock().await;
        if roles.iter().any(|stored| stored.name() == role.name()) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name()
            )));
        }

        roles.push(role);
        Ok(())
    }

    async fn update_role(&self, role: Role) -> AppResult<()> {
        let mut roles = self.roles.lock().await;
        if roles
            .iter()
            .any(|stored| stored.name() == role.name() && stored.id() != role.id())
        {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name()
            )));
        }

        let stored = roles
            .iter_mut()
            .find(|stored| stored.id() == role.id())
            .ok_or_else(|| AppError::NotFound(format!("role '{}' was not found", role.id())))?;
        *stored = role;
        Ok(())
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        self.roles.lock().await.retain(|role| role.id() != role_id);
        self.assignments
            .lock()
            .await
            .retain(|assignment| assignment.role_id != role_id);
        Ok(())
    }
}

#[async_trait]
impl RoleAssignmentRepository for FakeSecurityStore {
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<Role>> {
        let assignments = self.assignments.lock().await;
        let roles = self.roles.lock().await;

        Ok(roles
            .iter()
            .filter(|role| {
                assignments
                    .iter()
                    .any(|assignment| assignment.user_id == user_id && assignment.role_id == role.id())
            })
            .cloned()
            .collect())
    }

    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>> {
        Ok(self.assignments.lock().await.clone())
    }

    async fn grant_role(&self, assignment: RoleAssignment) -> AppResult<bool> {
        let mut assignments = self.assignments.lock().await;
        if assignments
            .iter()
            .any(|stored| stored.user_id == assignment.user_id && stored.role_id == assignment.role_id)
        {
            return Ok(false);
        }

        assignments.push(assignment);
        Ok(true)
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> AppResult<bool> {
        let mut assignments = self.assignments.lock().await;
        let before = assignments.len();
        assignments.retain(|stored| !(stored.user_id == user_id && stored.role_id == role_id));
        Ok(assignments.len() != before)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> AppResult<u64> {
        let mut assignments = self.assignments.lock().await;
        let before = assignments.len();
        assignments.retain(|stored| stored.user_id != user_id);
        Ok(u64::try_from(before - assignments.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl UserDirectory for FakeSecurityStore {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .find(|user| user.user_id == user_id)
            .cloned())
    }

    async fn upsert_user(&self, user: UserAccount) -> AppResult<()> {
        let mut users = self.users.lock().await;
        users.retain(|stored| stored.user_id != user.user_id);
        users.push(user);
        Ok(())
    }
}

#[derive(Default)]
struct FakeTaskTables {
    tasks: HashMap<TaskId, Task>,
    messages: Vec<TaskMessage>,
}

#[derive(Default)]
pub(crate) struct FakeTaskRepository {
    tables: Mutex<FakeTaskTables>,
}

#[async_trait]
impl TaskRepository for FakeTaskRepository {
    async fn insert_task(&self, task: Task) -> AppResult<()> {
        self.tables.lock().await.tasks.insert(task.id(), task);
        Ok(())
    }

    async fn find_task(&self, task_id: TaskId) -> AppResult<Option<Task>> {
        Ok(self.tables.lock().await.tasks.get(&task_id).cloned())
    }

    async fn list_tasks(&self, tenant_id: Option<TenantId>) -> AppResult<Vec<Task>> {
        Ok(self
            .tables
            .lock()
            .await
            .tasks
            .values()
            .filter(|task| tenant_id.is_none_or(|tenant_id| task.tenant_id() == tenant_id))
            .cloned()
            .collect())
    }

    async fn compare_and_set_state(&self, write: TaskTransitionWrite) -> AppResult<Task> {
        let mut tables = self.tables.lock().await;
        let task = tables
            .tasks
            .get(&write.task_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("task '{}' was not found", write.task_id)))?;

        if task.status() != write.expected_status {
            return Err(AppError::Conflict(format!(
                "task '{}' changed concurrently",
                write.task_id
            )));
        }

        let updated = task.with_state(write.next_state);
        tables.tasks.insert(updated.id(), updated.clone());
        if let Some(message) = write.message {
            tables.messages.push(message);
        }

        Ok(updated)
    }

    async fn list_task_messages(&self, task_id: TaskId) -> AppResult<Vec<TaskMessage>> {
        Ok(self
            .tables
            .lock()
            .await
            .messages
            .iter()
            .filter(|message| message.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn update_cached_traffic_lights(
        &self,
        updates: Vec<(TaskId, TrafficLight)>,
    ) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut updated = 0_u64;
        for (task_id, traffic_light) in updates {
            if let Some(task) = tables.tasks.get(&task_id).cloned() {
                tables
                    .tasks
                    .insert(task_id, task.with_cached_traffic_light(traffic_light));
                updated += 1;
            }
        }

        Ok(updated)
    }
}

#[derive(Default)]
pub(crate) struct RecordingAuditRepository {
    pub(crate) records: Mutex<Vec<AuditRecord>>,
}

#[async_trait]
impl AuditRepository for RecordingAuditRepository {
    async fn append_record(&self, record: AuditRecord) -> AppResult<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for RecordingAuditRepository {
    async fn list_records(&self, query: AuditLogQuery) -> AppResult<Vec<AuditRecord>> {
        let mut records: Vec<AuditRecord> = self
            .records
            .lock()
            .await
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        records.sort_by(|left, right| right.occurred_at.cmp(&left.occurred_at));

        Ok(records
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

pub(crate) struct FailingAuditRepository;

#[async_trait]
impl AuditRepository for FailingAuditRepository {
    async fn append_record(&self, _record: AuditRecord) -> AppResult<()> {
        Err(AppError::Internal("audit storage unavailable".to_owned()))
    }
}

pub(crate) fn authorization_service(store: &Arc<FakeSecurityStore>) -> AuthorizationService {
    AuthorizationService::new(
        store.clone(),
        store.clone(),
        Arc::new(SystemRoleLegacyMapping),
    )
}

/// Legacy mapping that implies nothing, so assigned roles are the only source.
pub(crate) struct NoLegacyPermissions;

impl LegacyRolePermissions for NoLegacyPermissions {
    fn permissions_for(&self, _legacy_role: LegacyRole) -> BTreeSet<Permission> {
        BTreeSet::new()
    }
}

pub(crate) fn roles_only_authorization_service(
    store: &Arc<FakeSecurityStore>,
) -> AuthorizationService {
    AuthorizationService::new(store.clone(), store.clone(), Arc::new(NoLegacyPermissions))
}
