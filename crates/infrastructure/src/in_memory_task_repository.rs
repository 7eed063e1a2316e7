use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use taskgate_application::{TaskRepository, TaskTransitionWrite};
use taskgate_core::{AppError, AppResult, TenantId};
use taskgate_domain::{Task, TaskId, TaskMessage, TrafficLight};

#[derive(Debug, Default)]
struct TaskTables {
    tasks: HashMap<TaskId, Task>,
    messages: Vec<TaskMessage>,
}

/// In-memory task store with compare-and-set transitions.
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tables: RwLock<TaskTables>,
}

impl InMemoryTaskRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert_task(&self, task: Task) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if tables.tasks.contains_key(&task.id()) {
            return Err(AppError::Conflict(format!(
                "task '{}' already exists",
                task.id()
            )));
        }

        tables.tasks.insert(task.id(), task);
        Ok(())
    }

    async fn find_task(&self, task_id: TaskId) -> AppResult<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(&task_id).cloned())
    }

    async fn list_tasks(&self, tenant_id: Option<TenantId>) -> AppResult<Vec<Task>> {
        let tables = self.tables.read().await;

        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|task| tenant_id.is_none_or(|tenant_id| task.tenant_id() == tenant_id))
            .cloned()
            .collect();
        tasks.sort_by_key(Task::created_at);

        Ok(tasks)
    }

    async fn compare_and_set_state(&self, write: TaskTransitionWrite) -> AppResult<Task> {
        let mut tables = self.tables.write().await;
        let current = tables
            .tasks
            .get(&write.task_id)
            .ok_or_else(|| AppError::NotFound(format!("task '{}' was not found", write.task_id)))?;

        if current.status() != write.expected_status {
            return Err(AppError::Conflict(format!(
                "task '{}' is no longer {}",
                write.task_id, write.expected_status
            )));
        }

        let updated = current.with_state(write.next_state);
        tables.tasks.insert(updated.id(), updated.clone());
        if let Some(message) = write.message {
            tables.messages.push(message);
        }

        Ok(updated)
    }

    async fn list_task_messages(&self, task_id: TaskId) -> AppResult<Vec<TaskMessage>> {
        Ok(self
            .tables
            .read()
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
        let mut tables = self.tables.write().await;
        let mut updated = 0_u64;

        for (task_id, traffic_light) in updates {
            if let Some(task) = tables.tasks.get_mut(&task_id) {
                *task = task.with_cached_traffic_light(traffic_light);
                updated += 1;
            }
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests;
