//! Taskgate API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;

use taskgate_core::AppError;
use tracing::{info, warn};

use crate::api_config::{ApiConfig, init_tracing};
use crate::api_router::build_router;
use crate::api_services::{StateParts, build_app_state, build_in_memory_parts, connect_and_migrate};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let parts = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = connect_and_migrate(database_url).await?;
            if config.migrate_only {
                info!("database migrations applied successfully");
                return Ok(());
            }
            StateParts::postgres(pool)
        }
        None => {
            warn!("DATABASE_URL is not set; using in-memory storage");
            build_in_memory_parts()
        }
    };

    let (app_state, audit_writer) = build_app_state(
        parts,
        config.audit_queue_capacity,
        config.trusted_proxies.clone(),
    );
    app_state.security_admin_service.seed_system_roles().await?;

    let app = build_router(app_state, &config.frontend_url)?;
    let address = config.socket_address()?;

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "taskgate-api listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")));

    let stats = audit_writer.shutdown().await;
    info!(
        enqueued = stats.enqueued,
        written = stats.written,
        dropped = stats.dropped,
        failed = stats.failed,
        "audit writer drained"
    );

    served
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
