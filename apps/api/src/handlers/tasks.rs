use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use taskgate_application::CreateTaskInput;
use taskgate_core::TenantId;
use taskgate_domain::{TaskId, TaskStatus};

use super::{Caller, caller_identity};
use crate::dto::{
    CreateTaskRequest, OverrideTaskStatusRequest, ReturnTaskRequest, TaskMessageResponse,
    TaskResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_tasks_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<TaskResponse>>> {
    let identity = caller_identity(caller);
    let tasks = state
        .task_service
        .list_tasks(identity.as_ref())
        .await?
        .into_iter()
        .map(TaskResponse::from)
        .collect();

    Ok(Json(tasks))
}

pub async fn create_task_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    let identity = caller_identity(caller);
    let tenant_id = payload
        .tenant_id
        .as_deref()
        .map(TenantId::from_str)
        .transpose()?;

    let task = state
        .task_service
        .create_task(
            identity.as_ref(),
            CreateTaskInput {
                title: payload.title,
                tenant_id,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

pub async fn get_task_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let identity = caller_identity(caller);
    let task_id = TaskId::from_str(task_id.as_str())?;
    let task = state
        .task_service
        .get_task(identity.as_ref(), task_id)
        .await?;

    Ok(Json(TaskResponse::from(task)))
}

pub async fn submit_task_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let identity = caller_identity(caller);
    let task_id = TaskId::from_str(task_id.as_str())?;
    let task = state
        .task_service
        .submit_task(identity.as_ref(), task_id)
        .await?;

    Ok(Json(TaskResponse::from(task)))
}

pub async fn complete_task_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let identity = caller_identity(caller);
    let task_id = TaskId::from_str(task_id.as_str())?;
    let task = state
        .task_service
        .complete_task(identity.as_ref(), task_id)
        .await?;

    Ok(Json(TaskResponse::from(task)))
}

pub async fn return_task_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
    Json(payload): Json<ReturnTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let identity = caller_identity(caller);
    let task_id = TaskId::from_str(task_id.as_str())?;
    let task = state
        .task_service
        .return_task(identity.as_ref(), task_id, payload.reason.as_str())
        .await?;

    Ok(Json(TaskResponse::from(task)))
}

pub async fn override_task_status_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
    Json(payload): Json<OverrideTaskStatusRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let identity = caller_identity(caller);
    let task_id = TaskId::from_str(task_id.as_str())?;
    let target = TaskStatus::from_str(payload.status.as_str())?;
    let task = state
        .task_service
        .override_task_status(identity.as_ref(), task_id, target)
        .await?;

    Ok(Json(TaskResponse::from(task)))
}

pub async fn list_task_messages_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Vec<TaskMessageResponse>>> {
    let identity = caller_identity(caller);
    let task_id = TaskId::from_str(task_id.as_str())?;
    let messages = state
        .task_service
        .list_task_messages(identity.as_ref(), task_id)
        .await?
        .into_iter()
        .map(TaskMessageResponse::from)
        .collect();

    Ok(Json(messages))
}
