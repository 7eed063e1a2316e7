use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use taskgate_core::AppError;

/// Display grouping for catalog permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    /// Task lifecycle permissions.
    Tasks,
    /// Role and user administration.
    Administration,
    /// Audit trail access.
    Audit,
}

impl PermissionCategory {
    /// Returns a stable display value for this category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Administration => "administration",
            Self::Audit => "audit",
        }
    }
}

/// Permission catalog enforced by application policy checks.
///
/// The catalog is closed: a role can only ever hold values of this enum, so a
/// dangling permission key cannot be persisted through the domain model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Allows reading tasks in the actor's tenant.
    ViewTask,
    /// Allows creating tasks.
    CreateTask,
    /// Allows administrative task edits, including status overrides.
    EditTask,
    /// Allows moving a task from open to submitted.
    SubmitTask,
    /// Allows moving a task from submitted to completed.
    CompleteTask,
    /// Allows returning a submitted task to open.
    ReturnTask,
    /// Allows acting on tasks outside the actor's own tenant.
    ViewAllTenants,
    /// Allows managing roles, grants and role assignments.
    ManageRoles,
    /// Allows deleting users and their assignments.
    ManageUsers,
    /// Allows reading the audit trail.
    ViewAuditLog,
}

impl Permission {
    /// Returns the stable catalog key for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewTask => "view_task",
            Self::CreateTask => "create_task",
            Self::EditTask => "edit_task",
            Self::SubmitTask => "submit_task",
            Self::CompleteTask => "complete_task",
            Self::ReturnTask => "return_task",
            Self::ViewAllTenants => "view_all_tenants",
            Self::ManageRoles => "manage_roles",
            Self::ManageUsers => "manage_users",
            Self::ViewAuditLog => "view_audit_log",
        }
    }

    /// Returns the human-readable description shown in administration views.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ViewTask => "View tasks",
            Self::CreateTask => "Create tasks",
            Self::EditTask => "Edit tasks and override their status",
            Self::SubmitTask => "Submit open tasks for review",
            Self::CompleteTask => "Complete submitted tasks",
            Self::ReturnTask => "Return submitted tasks with a reason",
            Self::ViewAllTenants => "Access tasks across all tenants",
            Self::ManageRoles => "Manage roles and role assignments",
            Self::ManageUsers => "Manage users",
            Self::ViewAuditLog => "View the audit log",
        }
    }

    /// Returns the display category.
    #[must_use]
    pub fn category(&self) -> PermissionCategory {
        match self {
            Self::ViewTask
            | Self::CreateTask
            | Self::EditTask
            | Self::SubmitTask
            | Self::CompleteTask
            | Self::ReturnTask
            | Self::ViewAllTenants => PermissionCategory::Tasks,
            Self::ManageRoles | Self::ManageUsers => PermissionCategory::Administration,
            Self::ViewAuditLog => PermissionCategory::Audit,
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::ViewTask,
            Permission::CreateTask,
            Permission::EditTask,
            Permission::SubmitTask,
            Permission::CompleteTask,
            Permission::ReturnTask,
            Permission::ViewAllTenants,
            Permission::ManageRoles,
            Permission::ManageUsers,
            Permission::ViewAuditLog,
        ];

        ALL
    }

    /// Parses a transport value into a permission.
    pub fn from_transport(value: &str) -> Result<Self, AppError> {
        Self::from_str(value)
    }
}

impl Display for Permission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown permission value '{value}'")))
    }
}
