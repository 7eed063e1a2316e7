use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskgate_application::AuditLogQuery;
use taskgate_core::{AppError, AppResult, UserId};
use taskgate_domain::{AuditRecord, AuditStatus, FieldChange};
use ts_rs::TS;

/// Query string accepted by the audit log listing.
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQueryParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_user_id: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<AuditLogQueryParams> for AuditLogQuery {
    type Error = AppError;

    fn try_from(value: AuditLogQueryParams) -> AppResult<Self> {
        let defaults = Self::default();
        let actor_user_id = value
            .actor_user_id
            .as_deref()
            .map(UserId::from_str)
            .transpose()?;
        let status = value
            .status
            .as_deref()
            .map(|status| {
                AuditStatus::parse(status).ok_or_else(|| {
                    AppError::Validation(format!("unknown audit status '{status}'"))
                })
            })
            .transpose()?;

        Ok(Self {
            limit: value.limit.unwrap_or(defaults.limit),
            offset: value.offset.unwrap_or(defaults.offset),
            action: value.action,
            entity_type: value.entity_type,
            entity_id: value.entity_id,
            actor_user_id,
            status,
        })
    }
}

/// One changed field of an audited snapshot.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/field-change-response.ts"
)]
pub struct FieldChangeResponse {
    pub field: String,
    #[ts(type = "unknown | null")]
    pub before: Option<Value>,
    #[ts(type = "unknown | null")]
    pub after: Option<Value>,
}

impl From<FieldChange> for FieldChangeResponse {
    fn from(value: FieldChange) -> Self {
        Self {
            field: value.field,
            before: value.before,
            after: value.after,
        }
    }
}

/// API representation of an audit record.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-record-response.ts"
)]
pub struct AuditRecordResponse {
    pub record_id: String,
    pub occurred_at: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub actor_user_id: Option<String>,
    pub actor_email: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    #[ts(type = "Record<string, unknown>")]
    pub metadata: serde_json::Map<String, Value>,
    pub changed_fields: Vec<FieldChangeResponse>,
}

impl From<AuditRecord> for AuditRecordResponse {
    fn from(value: AuditRecord) -> Self {
        let changed_fields = value
            .changed_fields()
            .into_iter()
            .map(FieldChangeResponse::from)
            .collect();

        Self {
            record_id: value.record_id.to_string(),
            occurred_at: value.occurred_at.to_rfc3339(),
            action: value.action.as_str().to_owned(),
            entity_type: value.entity_type.as_str().to_owned(),
            entity_id: value.entity_id,
            actor_user_id: value.actor_user_id.map(|user_id| user_id.to_string()),
            actor_email: value.actor_email,
            source_ip: value.source_ip,
            user_agent: value.user_agent,
            status: value.status.as_str().to_owned(),
            error_message: value.error_message,
            metadata: value.metadata,
            changed_fields,
        }
    }
}
