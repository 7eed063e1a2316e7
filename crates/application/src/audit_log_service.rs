use std::sync::Arc;

use taskgate_core::{AppResult, UserIdentity};
use taskgate_domain::{AuditRecord, Permission};

use crate::{AuditLogQuery, AuditLogRepository, AuthorizationService};

const MAX_PAGE_SIZE: usize = 500;

/// Read side of the audit trail.
#[derive(Clone)]
pub struct AuditLogService {
    authorization_service: AuthorizationService,
    repository: Arc<dyn AuditLogRepository>,
}

impl AuditLogService {
    /// Creates a new audit log service.
    #[must_use]
    pub fn new(
        authorization_service: AuthorizationService,
        repository: Arc<dyn AuditLogRepository>,
    ) -> Self {
        Self {
            authorization_service,
            repository,
        }
    }

    /// Returns audit records newest first.
    pub async fn list_records(
        &self,
        actor: &UserIdentity,
        mut query: AuditLogQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        self.authorization_service
            .require_permission(actor, Permission::ViewAuditLog)
            .await?;

        query.limit = query.limit.clamp(1, MAX_PAGE_SIZE);
        self.repository.list_records(query).await
    }
}
