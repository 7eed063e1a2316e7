use async_trait::async_trait;
use taskgate_core::{AppResult, UserId};
use taskgate_domain::{AuditRecord, AuditStatus};

/// Port for persisting append-only audit records.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit record.
    async fn append_record(&self, record: AuditRecord) -> AppResult<()>;
}

/// Query parameters for audit log listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogQuery {
    /// Maximum rows returned.
    pub limit: usize,
    /// Number of rows skipped for offset pagination.
    pub offset: usize,
    /// Optional action filter.
    pub action: Option<String>,
    /// Optional entity type filter.
    pub entity_type: Option<String>,
    /// Optional entity id filter.
    pub entity_id: Option<String>,
    /// Optional actor filter.
    pub actor_user_id: Option<UserId>,
    /// Optional outcome filter.
    pub status: Option<AuditStatus>,
}

impl Default for AuditLogQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            action: None,
            entity_type: None,
            entity_id: None,
            actor_user_id: None,
            status: None,
        }
    }
}

impl AuditLogQuery {
    /// Returns whether a record passes every filter.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.action
            .as_deref()
            .is_none_or(|action| record.action.as_str().eq_ignore_ascii_case(action))
            && self
                .entity_type
                .as_deref()
                .is_none_or(|entity_type| record.entity_type.as_str() == entity_type)
            && self
                .entity_id
                .as_deref()
                .is_none_or(|entity_id| record.entity_id.as_deref() == Some(entity_id))
            && self
                .actor_user_id
                .is_none_or(|actor| record.actor_user_id == Some(actor))
            && self.status.is_none_or(|status| record.status == status)
    }
}

/// Repository port for reading the audit trail.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Lists records newest first by `occurred_at`.
    async fn list_records(&self, query: AuditLogQuery) -> AppResult<Vec<AuditRecord>>;
}
