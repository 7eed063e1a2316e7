use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, patch, post, put};
use taskgate_core::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

use cors::build_cors_layer;

/// Builds the HTTP router. Every `/api` route runs through the audit middleware.
pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let api_routes = Router::new()
        .route(
            "/api/tasks",
            get(handlers::list_tasks_handler).post(handlers::create_task_handler),
        )
        .route("/api/tasks/{id}", get(handlers::get_task_handler))
        .route(
            "/api/tasks/{id}/submit",
            post(handlers::submit_task_handler),
        )
        .route(
            "/api/tasks/{id}/complete",
            post(handlers::complete_task_handler),
        )
        .route(
            "/api/tasks/{id}/return",
            post(handlers::return_task_handler),
        )
        .route(
            "/api/tasks/{id}/status",
            put(handlers::override_task_status_handler),
        )
        .route(
            "/api/tasks/{id}/messages",
            get(handlers::list_task_messages_handler),
        )
        .route("/api/permissions", get(handlers::list_permissions_handler))
        .route("/api/me/permissions", get(handlers::current_user_handler))
        .route(
            "/api/roles",
            get(handlers::list_roles_handler).post(handlers::create_role_handler),
        )
        .route(
            "/api/roles/{id}",
            patch(handlers::update_role_handler).delete(handlers::delete_role_handler),
        )
        .route(
            "/api/roles/{id}/permissions",
            put(handlers::replace_role_permissions_handler),
        )
        .route(
            "/api/role-assignments",
            get(handlers::list_role_assignments_handler).post(handlers::grant_role_handler),
        )
        .route(
            "/api/users/{user_id}/roles",
            get(handlers::user_roles_handler).delete(handlers::remove_user_assignments_handler),
        )
        .route(
            "/api/users/{user_id}/roles/{role_id}",
            delete(handlers::revoke_role_handler),
        )
        .route(
            "/api/audit-records",
            get(handlers::list_audit_records_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::audit_middleware,
        ));

    Ok(Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(api_routes)
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::resolve_identity,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(frontend_url)?)
        .with_state(app_state))
}

#[cfg(test)]
mod tests;
