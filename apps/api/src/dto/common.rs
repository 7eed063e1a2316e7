use serde::Serialize;
use taskgate_core::UserIdentity;
use ts_rs::TS;

/// Health response payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// API representation of the gateway-asserted caller.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/user-identity-response.ts"
)]
pub struct UserIdentityResponse {
    pub user_id: String,
    pub email: String,
    pub legacy_role: String,
    pub tenant_id: String,
    pub permissions: Vec<String>,
}

impl UserIdentityResponse {
    pub fn new<'a>(
        identity: &UserIdentity,
        permissions: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            user_id: identity.user_id().to_string(),
            email: identity.email().to_owned(),
            legacy_role: identity.legacy_role().as_str().to_owned(),
            tenant_id: identity.tenant_id().to_string(),
            permissions: permissions.into_iter().map(ToOwned::to_owned).collect(),
        }
    }
}
