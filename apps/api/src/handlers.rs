use axum::extract::Extension;
use taskgate_core::{AppError, AppResult, UserIdentity};

mod audit;
mod health;
mod security;
mod tasks;

pub use audit::list_audit_records_handler;
pub use health::health_handler;
pub use security::{
    create_role_handler, current_user_handler, delete_role_handler, grant_role_handler,
    list_permissions_handler, list_role_assignments_handler, list_roles_handler,
    remove_user_assignments_handler, replace_role_permissions_handler, revoke_role_handler,
    update_role_handler, user_roles_handler,
};
pub use tasks::{
    complete_task_handler, create_task_handler, get_task_handler, list_task_messages_handler,
    list_tasks_handler, override_task_status_handler, return_task_handler, submit_task_handler,
};

/// Identity attached by the gateway middleware, if any.
pub type Caller = Option<Extension<UserIdentity>>;

fn caller_identity(caller: Caller) -> Option<UserIdentity> {
    caller.map(|Extension(identity)| identity)
}

fn authenticated(caller: Caller) -> AppResult<UserIdentity> {
    caller_identity(caller)
        .ok_or_else(|| AppError::Unauthorized("request carries no identity".to_owned()))
}
