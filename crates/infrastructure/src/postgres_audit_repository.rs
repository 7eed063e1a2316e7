use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use taskgate_application::{AuditLogQuery, AuditLogRepository, AuditRepository};
use taskgate_core::{AppError, AppResult, UserId};
use taskgate_domain::{AuditAction, AuditChanges, AuditEntityType, AuditRecord, AuditStatus};

const MAX_LIST_OFFSET: usize = 100_000;

/// PostgreSQL-backed append-only audit trail.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditRecordRow {
    id: uuid::Uuid,
    action: String,
    entity_type: String,
    entity_id: Option<String>,
    actor_user_id: Option<uuid::Uuid>,
    actor_email: String,
    source_ip: Option<String>,
    user_agent: Option<String>,
    occurred_at: DateTime<Utc>,
    changes: Option<Value>,
    metadata: Value,
    status: String,
    error_message: Option<String>,
}

impl TryFrom<AuditRecordRow> for AuditRecord {
    type Error = AppError;

    fn try_from(row: AuditRecordRow) -> Result<Self, Self::Error> {
        let status = AuditStatus::parse(row.status.as_str()).ok_or_else(|| {
            AppError::Internal(format!(
                "invalid stored audit status '{}' for record '{}'",
                row.status, row.id
            ))
        })?;
        let changes = row
            .changes
            .map(serde_json::from_value::<AuditChanges>)
            .transpose()
            .map_err(|error| {
                AppError::Internal(format!(
                    "invalid stored audit changes for record '{}': {error}",
                    row.id
                ))
            })?;
        let metadata = match row.metadata {
            Value::Object(metadata) => metadata,
            _ => serde_json::Map::new(),
        };

        Ok(Self {
            record_id: row.id,
            action: AuditAction::parse(row.action.as_str()),
            entity_type: AuditEntityType::parse(row.entity_type.as_str()),
            entity_id: row.entity_id,
            actor_user_id: row.actor_user_id.map(UserId::from_uuid),
            actor_email: row.actor_email,
            source_ip: row.source_ip,
            user_agent: row.user_agent,
            occurred_at: row.occurred_at,
            changes,
            metadata,
            status,
            error_message: row.error_message,
        })
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_record(&self, record: AuditRecord) -> AppResult<()> {
        let changes = record
            .changes
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|error| {
                AppError::Internal(format!("failed to serialize audit changes: {error}"))
            })?;

        sqlx::query(
            r#"
            INSERT INTO audit_records (
                id,
                action,
                entity_type,
                entity_id,
                actor_user_id,
                actor_email,
                source_ip,
                user_agent,
                occurred_at,
                changes,
                metadata,
                status,
                error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.record_id)
        .bind(record.action.as_str())
        .bind(record.entity_type.as_str())
        .bind(record.entity_id.as_deref())
        .bind(record.actor_user_id.map(|user_id| user_id.as_uuid()))
        .bind(record.actor_email.as_str())
        .bind(record.source_ip.as_deref())
        .bind(record.user_agent.as_deref())
        .bind(record.occurred_at)
        .bind(changes)
        .bind(Value::Object(record.metadata))
        .bind(record.status.as_str())
        .bind(record.error_message.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append audit record: {error}")))?;

        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditRepository {
    async fn list_records(&self, query: AuditLogQuery) -> AppResult<Vec<AuditRecord>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset.min(MAX_LIST_OFFSET)).unwrap_or_default();

        let rows = sqlx::query_as::<_, AuditRecordRow>(
            r#"
            SELECT
                id,
                action,
                entity_type,
                entity_id,
                actor_user_id,
                actor_email,
                source_ip,
                user_agent,
                occurred_at,
                changes,
                metadata,
                status,
                error_message
            FROM audit_records
            WHERE ($1::TEXT IS NULL OR upper(action) = upper($1))
                AND ($2::TEXT IS NULL OR entity_type = $2)
                AND ($3::TEXT IS NULL OR entity_id = $3)
                AND ($4::UUID IS NULL OR actor_user_id = $4)
                AND ($5::TEXT IS NULL OR status = $5)
            ORDER BY occurred_at DESC, id
            LIMIT $6
            OFFSET $7
            "#,
        )
        .bind(query.action)
        .bind(query.entity_type)
        .bind(query.entity_id)
        .bind(query.actor_user_id.map(|user_id| user_id.as_uuid()))
        .bind(query.status.map(|status| status.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit records: {error}")))?;

        rows.into_iter().map(AuditRecord::try_from).collect()
    }
}
