//! Taskgate background worker refreshing the cached task urgency.

#![forbid(unsafe_code)]

use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use taskgate_application::{AuthorizationService, SystemRoleLegacyMapping, TaskService};
use taskgate_core::{AppError, AppResult};
use taskgate_infrastructure::{PostgresSecurityRepository, PostgresTaskRepository};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 3600;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    refresh_interval: Duration,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let task_service = build_task_service(pool);

    info!(
        refresh_interval_seconds = config.refresh_interval.as_secs(),
        "taskgate-worker started"
    );

    run_refresh_loop(&task_service, config.refresh_interval, shutdown_signal()).await;

    info!("taskgate-worker stopped");
    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_task_service(pool: PgPool) -> TaskService {
    let security_repository = Arc::new(PostgresSecurityRepository::new(pool.clone()));
    let authorization_service = AuthorizationService::new(
        security_repository.clone(),
        security_repository,
        Arc::new(SystemRoleLegacyMapping),
    );

    TaskService::new(
        authorization_service,
        Arc::new(PostgresTaskRepository::new(pool)),
    )
}

/// Refreshes the urgency cache on every tick until `shutdown` resolves.
///
/// The first refresh runs immediately. A failed cycle is logged and retried on the next tick.
async fn run_refresh_loop(
    task_service: &TaskService,
    refresh_interval: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                match task_service.refresh_traffic_light_cache(Utc::now()).await {
                    Ok(0) => {}
                    Ok(updated) => info!(updated, "refreshed task urgency cache"),
                    Err(error) => warn!(error = %error, "failed to refresh task urgency cache"),
                }
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let refresh_interval =
            parse_refresh_interval(env::var("URGENCY_REFRESH_INTERVAL_SECONDS").ok().as_deref())?;

        Ok(Self {
            database_url,
            refresh_interval,
        })
    }
}

fn parse_refresh_interval(value: Option<&str>) -> AppResult<Duration> {
    let seconds = match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!(
                "invalid URGENCY_REFRESH_INTERVAL_SECONDS value '{value}': {error}"
            ))
        })?,
        None => DEFAULT_REFRESH_INTERVAL_SECONDS,
    };

    if seconds == 0 {
        return Err(AppError::Validation(
            "URGENCY_REFRESH_INTERVAL_SECONDS must be greater than zero".to_owned(),
        ));
    }

    Ok(Duration::from_secs(seconds))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}
