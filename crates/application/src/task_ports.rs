use async_trait::async_trait;

use taskgate_core::{AppResult, TenantId};
use taskgate_domain::{Task, TaskId, TaskMessage, TaskState, TaskStatus, TrafficLight};

/// Conditional state write for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTransitionWrite {
    /// Task to update.
    pub task_id: TaskId,
    /// Status the caller observed; the write fails when it no longer matches.
    pub expected_status: TaskStatus,
    /// State to store.
    pub next_state: TaskState,
    /// Message stored in the same atomic write.
    pub message: Option<TaskMessage>,
}

/// Repository port for tasks.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Persists a new task.
    async fn insert_task(&self, task: Task) -> AppResult<()>;

    /// Finds a task by identifier.
    async fn find_task(&self, task_id: TaskId) -> AppResult<Option<Task>>;

    /// Lists tasks, optionally scoped to one tenant.
    async fn list_tasks(&self, tenant_id: Option<TenantId>) -> AppResult<Vec<Task>>;

    /// Atomically replaces the task state when its status still matches.
    ///
    /// Returns `NotFound` for a missing task and `Conflict` when another writer
    /// changed the status first.
    async fn compare_and_set_state(&self, write: TaskTransitionWrite) -> AppResult<Task>;

    /// Lists messages attached to a task in creation order.
    async fn list_task_messages(&self, task_id: TaskId) -> AppResult<Vec<TaskMessage>>;

    /// Stores recomputed urgency values. Returns the number of rows touched.
    async fn update_cached_traffic_lights(
        &self,
        updates: Vec<(TaskId, TrafficLight)>,
    ) -> AppResult<u64>;
}
