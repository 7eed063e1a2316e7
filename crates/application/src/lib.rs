//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_interceptor;
mod audit_log_service;
mod audit_ports;
mod audit_recorder;
mod authorization_service;
mod legacy_role_permissions;
mod security_admin_ports;
mod security_admin_service;
mod task_ports;
mod task_service;

pub use audit_interceptor::{
    AuditConfig, AuditInterceptor, EntityIdExtractor, RequestContext, ResponseStatus,
    SkipPredicate, infer_entity_type,
};
pub use audit_log_service::AuditLogService;
pub use audit_ports::{AuditLogQuery, AuditLogRepository, AuditRepository};
pub use audit_recorder::{
    AuditRecorder, AuditRecorderConfig, AuditRecorderStats, AuditWriterHandle,
};
pub use authorization_service::AuthorizationService;
pub use legacy_role_permissions::{LegacyRolePermissions, SystemRoleLegacyMapping};
pub use security_admin_ports::{
    CreateRoleInput, RoleAssignmentRepository, RoleRepository, UpdateRoleInput, UserAccount,
    UserDirectory,
};
pub use security_admin_service::SecurityAdminService;
pub use task_ports::{TaskRepository, TaskTransitionWrite};
pub use task_service::{CreateTaskInput, TaskService, TaskView};

#[cfg(test)]
mod test_support;
