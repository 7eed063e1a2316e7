use std::sync::Arc;

use ipnet::IpNet;
use taskgate_application::{
    AuditInterceptor, AuditLogService, AuthorizationService, SecurityAdminService, TaskService,
};

use crate::middleware::AuditPolicy;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub task_service: TaskService,
    pub security_admin_service: SecurityAdminService,
    pub authorization_service: AuthorizationService,
    pub audit_log_service: AuditLogService,
    pub audit_interceptor: AuditInterceptor,
    pub audit_policy: Arc<AuditPolicy>,
    pub trusted_proxies: Arc<Vec<IpNet>>,
}
