use serde::{Deserialize, Serialize};
use taskgate_application::TaskView;
use taskgate_domain::TaskMessage;
use ts_rs::TS;

/// Incoming payload for task creation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-task-request.ts"
)]
pub struct CreateTaskRequest {
    pub title: String,
    /// Defaults to the caller's tenant.
    #[serde(default)]
    #[ts(optional)]
    pub tenant_id: Option<String>,
}

/// Incoming payload for returning a submitted task.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/return-task-request.ts"
)]
pub struct ReturnTaskRequest {
    pub reason: String,
}

/// Incoming payload for administrative status overrides.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/override-task-status-request.ts"
)]
pub struct OverrideTaskStatusRequest {
    pub status: String,
}

/// API representation of a task.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/task-response.ts"
)]
pub struct TaskResponse {
    pub task_id: String,
    pub tenant_id: String,
    pub title: String,
    pub status: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub completed_by: Option<String>,
    pub traffic_light: String,
}

impl From<TaskView> for TaskResponse {
    fn from(value: TaskView) -> Self {
        let state = value.task.state();
        Self {
            task_id: value.task.id().to_string(),
            tenant_id: value.task.tenant_id().to_string(),
            title: value.task.title().to_owned(),
            status: value.task.status().as_str().to_owned(),
            created_at: value.task.created_at().to_rfc3339(),
            completed_at: state.completed_at().map(|at| at.to_rfc3339()),
            completed_by: state.completed_by().map(|user_id| user_id.to_string()),
            traffic_light: value.traffic_light.as_str().to_owned(),
        }
    }
}

/// API representation of a task message.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/task-message-response.ts"
)]
pub struct TaskMessageResponse {
    pub message_id: String,
    pub task_id: String,
    pub author: String,
    pub body: String,
    pub created_at: String,
}

impl From<TaskMessage> for TaskMessageResponse {
    fn from(value: TaskMessage) -> Self {
        Self {
            message_id: value.message_id.to_string(),
            task_id: value.task_id.to_string(),
            author: value.author.to_string(),
            body: value.body,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

/// Outcome of an urgency cache refresh.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/refresh-summary-response.ts"
)]
pub struct RefreshSummaryResponse {
    #[ts(type = "number")]
    pub updated: u64,
}
