use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskgate_core::{AppError, AppResult, NonEmptyString, TenantId, UserId};
use uuid::Uuid;

use crate::{Permission, TrafficLight};

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a task identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TaskId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid task id: {error}")))
    }
}

/// Flat task status used for storage and compare-and-set writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Initial state.
    Open,
    /// Waiting for the managing side.
    Submitted,
    /// Terminal state.
    Completed,
}

impl TaskStatus {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(Self::Open),
            "submitted" => Ok(Self::Submitted),
            "completed" => Ok(Self::Completed),
            _ => Err(AppError::Validation(format!(
                "unknown task status '{value}'"
            ))),
        }
    }
}

/// Lifecycle state of a task.
///
/// Completion metadata only exists inside [`TaskState::Completed`], so a task
/// can never carry a completion timestamp while open or submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    /// Initial state.
    Open,
    /// Waiting for the managing side.
    Submitted,
    /// Terminal state.
    Completed {
        /// Completion timestamp.
        completed_at: DateTime<Utc>,
        /// Completing actor.
        completed_by: UserId,
    },
}

impl TaskState {
    /// Rebuilds a state from flat persisted columns, validating the completion invariant.
    pub fn from_parts(
        status: TaskStatus,
        completed_at: Option<DateTime<Utc>>,
        completed_by: Option<UserId>,
    ) -> AppResult<Self> {
        match (status, completed_at, completed_by) {
            (TaskStatus::Open, None, None) => Ok(Self::Open),
            (TaskStatus::Submitted, None, None) => Ok(Self::Submitted),
            (TaskStatus::Completed, Some(completed_at), Some(completed_by)) => {
                Ok(Self::Completed {
                    completed_at,
                    completed_by,
                })
            }
            (status, _, _) => Err(AppError::Internal(format!(
                "persisted task with status '{status}' has inconsistent completion metadata"
            ))),
        }
    }

    /// Returns the flat status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Open => TaskStatus::Open,
            Self::Submitted => TaskStatus::Submitted,
            Self::Completed { .. } => TaskStatus::Completed,
        }
    }

    /// Returns the completion timestamp when completed.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Completed { completed_at, .. } => Some(*completed_at),
            Self::Open | Self::Submitted => None,
        }
    }

    /// Returns the completing actor when completed.
    #[must_use]
    pub fn completed_by(&self) -> Option<UserId> {
        match self {
            Self::Completed { completed_by, .. } => Some(*completed_by),
            Self::Open | Self::Submitted => None,
        }
    }

    /// Computes the next state for a transition or rejects it without side effects.
    pub fn apply(
        &self,
        transition: &TaskTransition,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> AppResult<Self> {
        match (self, transition) {
            (Self::Open, TaskTransition::Submit) => Ok(Self::Submitted),
            (Self::Submitted, TaskTransition::Complete) => Ok(Self::Completed {
                completed_at: at,
                completed_by: actor,
            }),
            (Self::Submitted, TaskTransition::Return { .. }) => Ok(Self::Open),
            (current, transition) => Err(AppError::Conflict(format!(
                "task cannot be {} while {}",
                transition.past_tense(),
                current.status()
            ))),
        }
    }

    /// Builds the state an administrative override lands on.
    #[must_use]
    pub fn overridden(target: TaskStatus, actor: UserId, at: DateTime<Utc>) -> Self {
        match target {
            TaskStatus::Open => Self::Open,
            TaskStatus::Submitted => Self::Submitted,
            TaskStatus::Completed => Self::Completed {
                completed_at: at,
                completed_by: actor,
            },
        }
    }
}

/// Guarded state machine moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTransition {
    /// `open -> submitted`.
    Submit,
    /// `submitted -> completed`.
    Complete,
    /// `submitted -> open` with a mandatory reason.
    Return {
        /// Reason recorded as a task message.
        reason: NonEmptyString,
    },
}

impl TaskTransition {
    /// Builds a return transition, rejecting blank reasons.
    pub fn returned(reason: impl Into<String>) -> AppResult<Self> {
        let reason = reason.into();
        let reason = NonEmptyString::new(reason.trim()).map_err(|_| {
            AppError::Validation("a reason is required to return a task".to_owned())
        })?;

        Ok(Self::Return { reason })
    }

    /// Returns the permission that guards this transition.
    #[must_use]
    pub fn required_permission(&self) -> Permission {
        match self {
            Self::Submit => Permission::SubmitTask,
            Self::Complete => Permission::CompleteTask,
            Self::Return { .. } => Permission::ReturnTask,
        }
    }

    /// Returns a stable transition name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Complete => "complete",
            Self::Return { .. } => "return",
        }
    }

    /// Returns the reason carried by a return transition.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Return { reason } => Some(reason.as_str()),
            Self::Submit | Self::Complete => None,
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            Self::Submit => "submitted",
            Self::Complete => "completed",
            Self::Return { .. } => "returned",
        }
    }
}

/// Tenant-scoped task tracked through the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    tenant_id: TenantId,
    title: NonEmptyString,
    created_at: DateTime<Utc>,
    state: TaskState,
    cached_traffic_light: Option<TrafficLight>,
}

impl Task {
    /// Creates a new open task.
    pub fn new(
        tenant_id: TenantId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let title = title.into();
        let title = NonEmptyString::new(title.trim())
            .map_err(|_| AppError::Validation("task title must not be empty".to_owned()))?;

        Ok(Self {
            id: TaskId::new(),
            tenant_id,
            title,
            created_at,
            state: TaskState::Open,
            cached_traffic_light: Some(TrafficLight::at(created_at, created_at)),
        })
    }

    /// Rebuilds a task from persisted parts.
    pub fn from_parts(
        id: TaskId,
        tenant_id: TenantId,
        title: impl Into<String>,
        created_at: DateTime<Utc>,
        state: TaskState,
        cached_traffic_light: Option<TrafficLight>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            tenant_id,
            title: NonEmptyString::new(title)?,
            created_at,
            state,
            cached_traffic_light,
        })
    }

    /// Returns the task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the task title.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Returns the flat status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    /// Returns the last stored urgency. May be stale; never use it for decisions.
    #[must_use]
    pub fn cached_traffic_light(&self) -> Option<TrafficLight> {
        self.cached_traffic_light
    }

    /// Computes the current urgency.
    #[must_use]
    pub fn traffic_light(&self, now: DateTime<Utc>) -> TrafficLight {
        TrafficLight::at(self.created_at, now)
    }

    /// Returns a copy of this task moved to another state.
    #[must_use]
    pub fn with_state(&self, state: TaskState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// Returns a copy of this task with a refreshed urgency cache.
    #[must_use]
    pub fn with_cached_traffic_light(&self, traffic_light: TrafficLight) -> Self {
        Self {
            cached_traffic_light: Some(traffic_light),
            ..self.clone()
        }
    }
}

/// Message attached to a task, such as the reason for a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Stable message identifier.
    pub message_id: Uuid,
    /// Task the message belongs to.
    pub task_id: TaskId,
    /// Message author.
    pub author: UserId,
    /// Message text.
    pub body: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TaskMessage {
    /// Creates a message with a fresh identifier.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        author: UserId,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            task_id,
            author,
            body: body.into(),
            created_at,
        }
    }
}
