use serde::{Deserialize, Serialize};
use taskgate_domain::{Permission, Role, RoleAssignment};
use ts_rs::TS;

/// Catalog entry of one permission.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/permission-response.ts"
)]
pub struct PermissionResponse {
    pub key: String,
    pub description: String,
    pub category: String,
}

impl From<Permission> for PermissionResponse {
    fn from(value: Permission) -> Self {
        Self {
            key: value.as_str().to_owned(),
            description: value.description().to_owned(),
            category: value.category().as_str().to_owned(),
        }
    }
}

/// API representation of a role.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/role-response.ts"
)]
pub struct RoleResponse {
    pub role_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub permissions: Vec<String>,
}

impl From<Role> for RoleResponse {
    fn from(value: Role) -> Self {
        Self {
            role_id: value.id().to_string(),
            name: value.name().to_owned(),
            description: value.description().map(ToOwned::to_owned),
            is_system: value.is_system(),
            permissions: value
                .permissions()
                .iter()
                .map(|permission| permission.as_str().to_owned())
                .collect(),
        }
    }
}

/// Incoming payload for custom role creation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/create-role-request.ts"
)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Incoming payload for partial role updates.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/update-role-request.ts"
)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    #[ts(optional)]
    pub name: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub permissions: Option<Vec<String>>,
}

/// Incoming payload replacing every permission of a role.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/replace-role-permissions-request.ts"
)]
pub struct ReplaceRolePermissionsRequest {
    pub permissions: Vec<String>,
}

/// Incoming payload for role grants.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/grant-role-request.ts"
)]
pub struct GrantRoleRequest {
    pub user_id: String,
    pub role_id: String,
}

/// API representation of a role assignment.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/role-assignment-response.ts"
)]
pub struct RoleAssignmentResponse {
    pub user_id: String,
    pub role_id: String,
    pub assigned_by: Option<String>,
    pub assigned_at: String,
}

impl From<RoleAssignment> for RoleAssignmentResponse {
    fn from(value: RoleAssignment) -> Self {
        Self {
            user_id: value.user_id.to_string(),
            role_id: value.role_id.to_string(),
            assigned_by: value.assigned_by.map(|user_id| user_id.to_string()),
            assigned_at: value.assigned_at.to_rfc3339(),
        }
    }
}

/// Number of assignments removed for a user.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/removed-assignments-response.ts"
)]
pub struct RemovedAssignmentsResponse {
    #[ts(type = "number")]
    pub removed: u64,
}
