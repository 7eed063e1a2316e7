//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod role;
mod security;
mod task;
mod traffic_light;

pub use audit::{
    ANONYMOUS_ACTOR_EMAIL, AuditAction, AuditChanges, AuditEntityType, AuditRecord, AuditStatus,
    FieldChange,
};
pub use role::{Role, RoleAssignment, RoleId, SystemRole};
pub use security::{Permission, PermissionCategory};
pub use task::{Task, TaskId, TaskMessage, TaskState, TaskStatus, TaskTransition};
pub use traffic_light::{TrafficLight, age_in_days};
