mod audit;
mod common;
mod security;
mod tasks;

pub use audit::{AuditLogQueryParams, AuditRecordResponse, FieldChangeResponse};
pub use common::{HealthResponse, UserIdentityResponse};
pub use security::{
    CreateRoleRequest, GrantRoleRequest, PermissionResponse, RemovedAssignmentsResponse,
    ReplaceRolePermissionsRequest, RoleAssignmentResponse, RoleResponse, UpdateRoleRequest,
};
pub use tasks::{
    CreateTaskRequest, OverrideTaskStatusRequest, RefreshSummaryResponse, ReturnTaskRequest,
    TaskMessageResponse, TaskResponse,
};
