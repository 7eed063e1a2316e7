use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskgate_core::{AppError, AppResult, TenantId, UserIdentity};
use taskgate_domain::{
    Permission, Task, TaskId, TaskMessage, TaskState, TaskStatus, TaskTransition, TrafficLight,
};
use tracing::{info, warn};

use crate::authorization_service::ensure_granted;
use crate::{AuthorizationService, TaskRepository, TaskTransitionWrite};

/// Input payload for task creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskInput {
    /// Task title.
    pub title: String,
    /// Target tenant; defaults to the actor's tenant.
    pub tenant_id: Option<TenantId>,
}

/// Task projection with urgency computed at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    /// Stored task.
    pub task: Task,
    /// Current urgency.
    pub traffic_light: TrafficLight,
}

impl TaskView {
    fn at(task: Task, now: DateTime<Utc>) -> Self {
        let traffic_light = task.traffic_light(now);
        Self {
            task,
            traffic_light,
        }
    }
}

/// Application service driving the task state machine.
#[derive(Clone)]
pub struct TaskService {
    authorization_service: AuthorizationService,
    repository: Arc<dyn TaskRepository>,
}

impl TaskService {
    /// Creates a new task service.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        repository: Arc<dyn TaskRepository>,
    ) -> Self {
        Self {
            authorization_service,
            repository,
        }
    }

    /// Creates an open task.
    pub async fn create_task(
        &self,
        actor: Option<&UserIdentity>,
        input: CreateTaskInput,
    ) -> AppResult<TaskView> {
        let actor = require_identity(actor)?;
        let permissions = self.authorization_service.actor_permissions(actor).await?;
        let tenant_id = input.tenant_id.unwrap_or(actor.tenant_id());
        ensure_tenant_access(actor, tenant_id, &permissions)?;
        ensure_granted(actor, &permissions, Permission::CreateTask)?;

        let now = Utc::now();
        let task = Task::new(tenant_id, input.title, now)?;
        self.repository.insert_task(task.clone()).await?;

        info!(actor = %actor.user_id(), task_id = %task.id(), tenant_id = %tenant_id, "created task");
        Ok(TaskView::at(task, now))
    }

    /// Returns one task.
    pub async fn get_task(
        &self,
        actor: Option<&UserIdentity>,
        task_id: TaskId,
    ) -> AppResult<TaskView> {
        let actor = require_identity(actor)?;
        let task = self.load_task(task_id).await?;
        self.authorize(actor, &task, Permission::ViewTask).await?;

        Ok(TaskView::at(task, Utc::now()))
    }

    /// Lists tasks visible to the actor, oldest first.
    pub async fn list_tasks(&self, actor: Option<&UserIdentity>) -> AppResult<Vec<TaskView>> {
        let actor = require_identity(actor)?;
        let permissions = self.authorization_service.actor_permissions(actor).await?;
        ensure_granted(actor, &permissions, Permission::ViewTask)?;

        let scope = (!permissions.contains(&Permission::ViewAllTenants)).then_some(actor.tenant_id());
        let mut tasks = self.repository.list_tasks(scope).await?;
        tasks.sort_by_key(Task::created_at);

        let now = Utc::now();
        Ok(tasks
            .into_iter()
            .map(|task| TaskView::at(task, now))
            .collect())
    }

    /// Moves an open task to submitted.
    pub async fn submit_task(
        &self,
        actor: Option<&UserIdentity>,
        task_id: TaskId,
    ) -> AppResult<TaskView> {
        self.transition(actor, task_id, TaskTransition::Submit)
            .await
    }

    /// Moves a submitted task to completed.
    pub async fn complete_task(
        &self,
        actor: Option<&UserIdentity>,
        task_id: TaskId,
    ) -> AppResult<TaskView> {
        self.transition(actor, task_id, TaskTransition::Complete)
            .await
    }

    /// Returns a submitted task to open, recording the reason as a message.
    pub async fn return_task(
        &self,
        actor: Option<&UserIdentity>,
        task_id: TaskId,
        reason: &str,
    ) -> AppResult<TaskView> {
        let actor = require_identity(actor)?;
        let task = self.load_task(task_id).await?;
        self.authorize(actor, &task, Permission::ReturnTask).await?;

        let transition = TaskTransition::returned(reason)?;
        self.apply_transition(actor, task, transition).await
    }

    /// Forces a task into any status. Completion metadata follows the target status.
    pub async fn override_task_status(
        &self,
        actor: Option<&UserIdentity>,
        task_id: TaskId,
        target: TaskStatus,
    ) -> AppResult<TaskView> {
        let actor = require_identity(actor)?;
        let task = self.load_task(task_id).await?;
        self.authorize(actor, &task, Permission::EditTask).await?;

        let now = Utc::now();
        let next_state = TaskState::overridden(target, actor.user_id(), now);
        let updated = self
            .repository
            .compare_and_set_state(TaskTransitionWrite {
                task_id,
                expected_status: task.status(),
                next_state,
                message: None,
            })
            .await?;

        warn!(
            actor = %actor.user_id(),
            task_id = %task_id,
            from = %task.status(),
            to = %target,
            "task status overridden"
        );

        Ok(TaskView::at(updated, now))
    }

    /// Lists messages attached to a task.
    pub async fn list_task_messages(
        &self,
        actor: Option<&UserIdentity>,
        task_id: TaskId,
    ) -> AppResult<Vec<TaskMessage>> {
        let actor = require_identity(actor)?;
        let task = self.load_task(task_id).await?;
        self.authorize(actor, &task, Permission::ViewTask).await?;

        self.repository.list_task_messages(task_id).await
    }

    /// Rewrites the cached urgency column for tasks whose cached value is stale.
    ///
    /// Runs without an actor; it is invoked by the background worker only.
    pub async fn refresh_traffic_light_cache(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let updates: Vec<(TaskId, TrafficLight)> = self
            .repository
            .list_tasks(None)
            .await?
            .into_iter()
            .filter(|task| task.status() != TaskStatus::Completed)
            .filter_map(|task| {
                let current = task.traffic_light(now);
                (task.cached_traffic_light() != Some(current)).then_some((task.id(), current))
            })
            .collect();

        if updates.is_empty() {
            return Ok(0);
        }

        self.repository.update_cached_traffic_lights(updates).await
    }

    async fn transition(
        &self,
        actor: Option<&UserIdentity>,
        task_id: TaskId,
        transition: TaskTransition,
    ) -> AppResult<TaskView> {
        let actor = require_identity(actor)?;
        let task = self.load_task(task_id).await?;
        self.authorize(actor, &task, transition.required_permission())
            .await?;

        self.apply_transition(actor, task, transition).await
    }

    async fn apply_transition(
        &self,
        actor: &UserIdentity,
        task: Task,
        transition: TaskTransition,
    ) -> AppResult<TaskView> {
        let task_id = task.id();
        let now = Utc::now();
        let next_state = task.state().apply(&transition, actor.user_id(), now)?;
        let message = transition
            .reason()
            .map(|reason| TaskMessage::new(task_id, actor.user_id(), reason, now));

        let updated = self
            .repository
            .compare_and_set_state(TaskTransitionWrite {
                task_id,
                expected_status: task.status(),
                next_state,
                message,
            })
            .await?;

        info!(
            actor = %actor.user_id(),
            task_id = %task_id,
            transition = transition.name(),
            status = %updated.status(),
            "task transitioned"
        );

        Ok(TaskView::at(updated, now))
    }

    async fn load_task(&self, task_id: TaskId) -> AppResult<Task> {
        self.repository
            .find_task(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task '{task_id}' was not found")))
    }

    /// Tenant match first, then the specific permission. Anything else is denied;
    /// `edit_task` does not substitute for a transition permission.
    async fn authorize(
        &self,
        actor: &UserIdentity,
        task: &Task,
        permission: Permission,
    ) -> AppResult<()> {
        let permissions = self.authorization_service.actor_permissions(actor).await?;
        ensure_tenant_access(actor, task.tenant_id(), &permissions)?;
        ensure_granted(actor, &permissions, permission)
    }
}

fn require_identity(actor: Option<&UserIdentity>) -> AppResult<&UserIdentity> {
    actor.ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))
}

fn ensure_tenant_access(
    actor: &UserIdentity,
    tenant_id: TenantId,
    permissions: &BTreeSet<Permission>,
) -> AppResult<()> {
    if actor.tenant_id() == tenant_id || permissions.contains(&Permission::ViewAllTenants) {
        return Ok(());
    }

    Err(AppError::Forbidden(format!(
        "user '{}' cannot access tenant '{tenant_id}'",
        actor.email()
    )))
}
