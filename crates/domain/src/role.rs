use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskgate_core::{AppError, AppResult, NonEmptyString, UserId};
use uuid::Uuid;

use crate::Permission;

/// Unique identifier for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
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

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for RoleId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid role id: {error}")))
    }
}

/// Named bundle of catalog permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
    description: Option<String>,
    is_system: bool,
    permissions: BTreeSet<Permission>,
}

impl Role {
    /// Creates a mutable, tenant-defined role.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> AppResult<Self> {
        Ok(Self {
            id: RoleId::new(),
            name: normalized_name(name.into())?,
            description: normalized_description(description),
            is_system: false,
            permissions: permissions.into_iter().collect(),
        })
    }

    /// Rebuilds a role from persisted parts.
    pub fn from_parts(
        id: RoleId,
        name: impl Into<String>,
        description: Option<String>,
        is_system: bool,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            name: normalized_name(name.into())?,
            description,
            is_system,
            permissions: permissions.into_iter().collect(),
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the unique role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns whether the role is system-managed.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns the granted permissions.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }

    /// Returns whether the role grants the permission.
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Renames the role. System role names are immutable.
    pub fn rename(&mut self, name: impl Into<String>) -> AppResult<()> {
        let name = normalized_name(name.into())?;
        if name == self.name {
            return Ok(());
        }

        if self.is_system {
            return Err(AppError::Validation(format!(
                "system role '{}' cannot be renamed",
                self.name
            )));
        }

        self.name = name;
        Ok(())
    }

    /// Replaces the description.
    pub fn set_description(&mut self, description: Option<String>) {
        self.description = normalized_description(description);
    }

    /// Replaces the whole permission set.
    pub fn replace_permissions(&mut self, permissions: impl IntoIterator<Item = Permission>) {
        self.permissions = permissions.into_iter().collect();
    }

    /// Fails when the role may not be deleted.
    pub fn ensure_deletable(&self) -> AppResult<()> {
        if self.is_system {
            return Err(AppError::Validation(format!(
                "system role '{}' cannot be deleted",
                self.name
            )));
        }

        Ok(())
    }
}

fn normalized_name(value: String) -> AppResult<NonEmptyString> {
    NonEmptyString::new(value.trim())
        .map_err(|_| AppError::Validation("role name must not be empty".to_owned()))
}

fn normalized_description(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Built-in roles seeded for every installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemRole {
    /// Full access.
    Administrator,
    /// Managing side of a tenant.
    Employee,
    /// Counterpart side of a tenant.
    Customer,
}

impl SystemRole {
    /// Returns all system roles.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Administrator, Self::Employee, Self::Customer]
    }

    /// Returns the immutable role name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Employee => "employee",
            Self::Customer => "customer",
        }
    }

    /// Returns the seeded description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Administrator => "Full access to every tenant and the audit trail",
            Self::Employee => "Manages, completes and returns tasks",
            Self::Customer => "Views and submits own tasks",
        }
    }

    /// Returns the seeded permission set.
    #[must_use]
    pub fn permissions(&self) -> BTreeSet<Permission> {
        match self {
            Self::Administrator => Permission::all().iter().copied().collect(),
            Self::Employee => BTreeSet::from([
                Permission::ViewTask,
                Permission::CreateTask,
                Permission::EditTask,
                Permission::CompleteTask,
                Permission::ReturnTask,
            ]),
            Self::Customer => BTreeSet::from([Permission::ViewTask, Permission::SubmitTask]),
        }
    }

    /// Builds a fresh role value for seeding.
    pub fn to_role(&self) -> AppResult<Role> {
        Role::from_parts(
            RoleId::new(),
            self.name(),
            Some(self.description().to_owned()),
            true,
            self.permissions(),
        )
    }
}

/// Assignment of a role to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Assigned user.
    pub user_id: UserId,
    /// Assigned role.
    pub role_id: RoleId,
    /// Actor that granted the role, absent for seeded grants.
    pub assigned_by: Option<UserId>,
    /// Grant timestamp.
    pub assigned_at: DateTime<Utc>,
}
