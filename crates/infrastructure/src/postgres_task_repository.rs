use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use taskgate_application::{TaskRepository, TaskTransitionWrite};
use taskgate_core::{AppError, AppResult, TenantId, UserId};
use taskgate_domain::{Task, TaskId, TaskMessage, TaskState, TaskStatus, TrafficLight};

/// PostgreSQL-backed task store. Transitions are conditional updates on the current status.
#[derive(Clone)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    title: String,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<uuid::Uuid>,
    traffic_light: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let invalid = |error: AppError| {
            AppError::Internal(format!("invalid stored task '{}': {error}", row.id))
        };
        let status = TaskStatus::from_str(row.status.as_str()).map_err(invalid)?;
        let state = TaskState::from_parts(
            status,
            row.completed_at,
            row.completed_by.map(UserId::from_uuid),
        )
        .map_err(invalid)?;
        let traffic_light = row
            .traffic_light
            .as_deref()
            .map(TrafficLight::from_str)
            .transpose()
            .map_err(invalid)?;

        Task::from_parts(
            TaskId::from_uuid(row.id),
            TenantId::from_uuid(row.tenant_id),
            row.title,
            row.created_at,
            state,
            traffic_light,
        )
    }
}

#[derive(Debug, FromRow)]
struct TaskMessageRow {
    id: uuid::Uuid,
    task_id: uuid::Uuid,
    author_user_id: uuid::Uuid,
    body: String,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn insert_task(&self, task: Task) -> AppResult<()> {
        let state = task.state();
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id,
                tenant_id,
                title,
                status,
                created_at,
                completed_at,
                completed_by,
                traffic_light
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(task.id().as_uuid())
        .bind(task.tenant_id().as_uuid())
        .bind(task.title())
        .bind(task.status().as_str())
        .bind(task.created_at())
        .bind(state.completed_at())
        .bind(state.completed_by().map(|user_id| user_id.as_uuid()))
        .bind(task.cached_traffic_light().map(|light| light.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23505")
            {
                return AppError::Conflict(format!("task '{}' already exists", task.id()));
            }

            AppError::Internal(format!("failed to insert task: {error}"))
        })?;

        Ok(())
    }

    async fn find_task(&self, task_id: TaskId) -> AppResult<Option<Task>> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, tenant_id, title, status, created_at, completed_at, completed_by, traffic_light
            FROM tasks
            WHERE id = $1
            "#,
        )
        .bind(task_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load task: {error}")))?
        .map(Task::try_from)
        .transpose()
    }

    async fn list_tasks(&self, tenant_id: Option<TenantId>) -> AppResult<Vec<Task>> {
        sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, tenant_id, title, status, created_at, completed_at, completed_by, traffic_light
            FROM tasks
            WHERE ($1::UUID IS NULL OR tenant_id = $1)
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id.map(|tenant_id| tenant_id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list tasks: {error}")))?
        .into_iter()
        .map(Task::try_from)
        .collect()
    }

    async fn compare_and_set_state(&self, write: TaskTransitionWrite) -> AppResult<Task> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let updated = sqlx::query_as::<_, TaskRow>(
            r#"
            UPDATE tasks
            SET status = $2, completed_at = $3, completed_by = $4
            WHERE id = $1 AND status = $5
            RETURNING id, tenant_id, title, status, created_at, completed_at, completed_by, traffic_light
            "#,
        )
        .bind(write.task_id.as_uuid())
        .bind(write.next_state.status().as_str())
        .bind(write.next_state.completed_at())
        .bind(write.next_state.completed_by().map(|user_id| user_id.as_uuid()))
        .bind(write.expected_status.as_str())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update task status: {error}")))?;

        let Some(updated) = updated else {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM tasks WHERE id = $1)")
                .bind(write.task_id.as_uuid())
                .fetch_one(&mut *transaction)
                .await
                .map_err(|error| AppError::Internal(format!("failed to load task: {error}")))?;

            return Err(if exists {
                AppError::Conflict(format!(
                    "task '{}' is no longer {}",
                    write.task_id, write.expected_status
                ))
            } else {
                AppError::NotFound(format!("task '{}' was not found", write.task_id))
            });
        };

        if let Some(message) = write.message.as_ref() {
            sqlx::query(
                r#"
                INSERT INTO task_messages (id, task_id, author_user_id, body, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(message.message_id)
            .bind(message.task_id.as_uuid())
            .bind(message.author.as_uuid())
            .bind(message.body.as_str())
            .bind(message.created_at)
            .execute(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to record task message: {error}")))?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Task::try_from(updated)
    }

    async fn list_task_messages(&self, task_id: TaskId) -> AppResult<Vec<TaskMessage>> {
        let rows = sqlx::query_as::<_, TaskMessageRow>(
            r#"
            SELECT id, task_id, author_user_id, body, created_at
            FROM task_messages
            WHERE task_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(task_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list task messages: {error}")))?;

        Ok(rows
            .into_iter()
            .map(|row| TaskMessage {
                message_id: row.id,
                task_id: TaskId::from_uuid(row.task_id),
                author: UserId::from_uuid(row.author_user_id),
                body: row.body,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn update_cached_traffic_lights(
        &self,
        updates: Vec<(TaskId, TrafficLight)>,
    ) -> AppResult<u64> {
        let (task_ids, lights): (Vec<uuid::Uuid>, Vec<String>) = updates
            .iter()
            .map(|(task_id, light)| (task_id.as_uuid(), light.as_str().to_owned()))
            .unzip();

        Ok(sqlx::query(
            r#"
            UPDATE tasks
            SET traffic_light = updates.traffic_light
            FROM UNNEST($1::UUID[], $2::TEXT[]) AS updates(task_id, traffic_light)
            WHERE tasks.id = updates.task_id
            "#,
        )
        .bind(task_ids)
        .bind(lights)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to refresh cached traffic lights: {error}"))
        })?
        .rows_affected())
    }
}
