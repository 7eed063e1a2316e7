use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AppError, TenantId, UserId};

/// Coarse two-tier classification that predates fine-grained roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyRole {
    /// Staff member on the managing side of a tenant.
    Employee,
    /// Counterpart that owns and submits tasks.
    Customer,
}

impl LegacyRole {
    /// Returns a stable storage value for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Customer => "customer",
        }
    }
}

impl Display for LegacyRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for LegacyRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Self::Employee),
            "customer" => Ok(Self::Customer),
            other => Err(AppError::Validation(format!(
                "unknown legacy role '{other}'"
            ))),
        }
    }
}

/// Already-authenticated caller identity handed to the core by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    user_id: UserId,
    email: String,
    legacy_role: LegacyRole,
    tenant_id: TenantId,
}

impl UserIdentity {
    /// Creates a user identity from authentication and tenancy data.
    #[must_use]
    pub fn new(
        user_id: UserId,
        email: impl Into<String>,
        legacy_role: LegacyRole,
        tenant_id: TenantId,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            legacy_role,
            tenant_id,
        }
    }

    /// Returns the stable user identifier.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the email address used for display and audit attribution.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns the coarse legacy classification.
    #[must_use]
    pub fn legacy_role(&self) -> LegacyRole {
        self.legacy_role
    }

    /// Returns the tenant linked to the identity.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
