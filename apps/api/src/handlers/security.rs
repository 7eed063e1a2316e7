use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use taskgate_application::{CreateRoleInput, UpdateRoleInput};
use taskgate_core::UserId;
use taskgate_domain::{Permission, RoleId};

use super::{Caller, authenticated};
use crate::dto::{
    CreateRoleRequest, GrantRoleRequest, PermissionResponse, RemovedAssignmentsResponse,
    ReplaceRolePermissionsRequest, RoleAssignmentResponse, RoleResponse, UpdateRoleRequest,
    UserIdentityResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_permissions_handler(caller: Caller) -> ApiResult<Json<Vec<PermissionResponse>>> {
    authenticated(caller)?;

    Ok(Json(
        Permission::all()
            .iter()
            .copied()
            .map(PermissionResponse::from)
            .collect(),
    ))
}

pub async fn current_user_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<UserIdentityResponse>> {
    let user = authenticated(caller)?;
    let permissions = state
        .authorization_service
        .actor_permissions(&user)
        .await?;

    Ok(Json(UserIdentityResponse::new(
        &user,
        permissions.iter().map(Permission::as_str),
    )))
}

pub async fn list_roles_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    let user = authenticated(caller)?;
    let roles = state
        .security_admin_service
        .list_roles(&user)
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(roles))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    let user = authenticated(caller)?;
    let role = state
        .security_admin_service
        .create_role(
            &user,
            CreateRoleInput {
                name: payload.name,
                description: payload.description,
                permissions: payload.permissions,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

pub async fn update_role_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(role_id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let user = authenticated(caller)?;
    let role_id = RoleId::from_str(role_id.as_str())?;
    let role = state
        .security_admin_service
        .update_role(
            &user,
            role_id,
            UpdateRoleInput {
                name: payload.name,
                description: payload.description,
                permissions: payload.permissions,
            },
        )
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn replace_role_permissions_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(role_id): Path<String>,
    Json(payload): Json<ReplaceRolePermissionsRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let user = authenticated(caller)?;
    let role_id = RoleId::from_str(role_id.as_str())?;
    let role = state
        .security_admin_service
        .replace_role_permissions(&user, role_id, payload.permissions.as_slice())
        .await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(role_id): Path<String>,
) -> ApiResult<StatusCode> {
    let user = authenticated(caller)?;
    let role_id = RoleId::from_str(role_id.as_str())?;
    state
        .security_admin_service
        .delete_role(&user, role_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_role_assignments_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<RoleAssignmentResponse>>> {
    let user = authenticated(caller)?;
    let assignments = state
        .security_admin_service
        .list_role_assignments(&user)
        .await?
        .into_iter()
        .map(RoleAssignmentResponse::from)
        .collect();

    Ok(Json(assignments))
}

pub async fn grant_role_handler(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<GrantRoleRequest>,
) -> ApiResult<StatusCode> {
    let user = authenticated(caller)?;
    let user_id = UserId::from_str(payload.user_id.as_str())?;
    let role_id = RoleId::from_str(payload.role_id.as_str())?;
    state
        .security_admin_service
        .grant_role(&user, user_id, role_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn user_roles_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    let user = authenticated(caller)?;
    let user_id = UserId::from_str(user_id.as_str())?;
    let roles = state
        .security_admin_service
        .user_roles(&user, user_id)
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(roles))
}

pub async fn revoke_role_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path((user_id, role_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user = authenticated(caller)?;
    let user_id = UserId::from_str(user_id.as_str())?;
    let role_id = RoleId::from_str(role_id.as_str())?;
    state
        .security_admin_service
        .revoke_role(&user, user_id, role_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_user_assignments_handler(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> ApiResult<Json<RemovedAssignmentsResponse>> {
    let user = authenticated(caller)?;
    let user_id = UserId::from_str(user_id.as_str())?;
    let removed = state
        .security_admin_service
        .remove_user_assignments(&user, user_id)
        .await?;

    Ok(Json(RemovedAssignmentsResponse { removed }))
}
