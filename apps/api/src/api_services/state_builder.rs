use std::sync::Arc;

use ipnet::IpNet;
use sqlx::PgPool;
use taskgate_application::{
    AuditInterceptor, AuditLogRepository, AuditLogService, AuditRecorder, AuditRecorderConfig,
    AuditRepository, AuditWriterHandle, AuthorizationService, RoleAssignmentRepository,
    RoleRepository, SecurityAdminService, SystemRoleLegacyMapping, TaskRepository, TaskService,
    UserDirectory,
};
use taskgate_infrastructure::{
    InMemoryAuditRepository, InMemorySecurityRepository, InMemoryTaskRepository,
    PostgresAuditRepository, PostgresSecurityRepository, PostgresTaskRepository,
};

use crate::middleware::AuditPolicy;
use crate::state::AppState;

/// Repository set backing the services.
#[derive(Clone)]
pub struct StateParts {
    pub roles: Arc<dyn RoleRepository>,
    pub assignments: Arc<dyn RoleAssignmentRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub tasks: Arc<dyn TaskRepository>,
    pub audit_writer: Arc<dyn AuditRepository>,
    pub audit_reader: Arc<dyn AuditLogRepository>,
}

impl StateParts {
    pub fn postgres(pool: PgPool) -> Self {
        let security = Arc::new(PostgresSecurityRepository::new(pool.clone()));
        let audit = Arc::new(PostgresAuditRepository::new(pool.clone()));

        Self {
            roles: security.clone(),
            assignments: security.clone(),
            users: security,
            tasks: Arc::new(PostgresTaskRepository::new(pool)),
            audit_writer: audit.clone(),
            audit_reader: audit,
        }
    }
}

pub fn build_in_memory_parts() -> StateParts {
    let security = Arc::new(InMemorySecurityRepository::new());
    let audit = Arc::new(InMemoryAuditRepository::new());

    StateParts {
        roles: security.clone(),
        assignments: security.clone(),
        users: security,
        tasks: Arc::new(InMemoryTaskRepository::new()),
        audit_writer: audit.clone(),
        audit_reader: audit,
    }
}

/// Wires services over `parts` and starts the audit writer.
pub fn build_app_state(
    parts: StateParts,
    audit_queue_capacity: usize,
    trusted_proxies: Vec<IpNet>,
) -> (AppState, AuditWriterHandle) {
    let authorization_service = AuthorizationService::new(
        parts.assignments.clone(),
        parts.users.clone(),
        Arc::new(SystemRoleLegacyMapping),
    );

    let recorder = AuditRecorder::new(AuditRecorderConfig {
        capacity: audit_queue_capacity,
    });
    let audit_writer = recorder.start(parts.audit_writer);

    let state = AppState {
        task_service: TaskService::new(authorization_service.clone(), parts.tasks),
        security_admin_service: SecurityAdminService::new(
            authorization_service.clone(),
            parts.roles,
            parts.assignments,
            parts.users,
        ),
        audit_log_service: AuditLogService::new(authorization_service.clone(), parts.audit_reader),
        authorization_service,
        audit_interceptor: AuditInterceptor::new(recorder),
        audit_policy: Arc::new(AuditPolicy::standard()),
        trusted_proxies: Arc::new(trusted_proxies),
    };

    (state, audit_writer)
}
