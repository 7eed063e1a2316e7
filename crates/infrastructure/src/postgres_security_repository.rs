use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use taskgate_application::{
    RoleAssignmentRepository, RoleRepository, UserAccount, UserDirectory,
};
use taskgate_core::{AppError, AppResult, LegacyRole, TenantId, UserId};
use taskgate_domain::{Permission, Role, RoleAssignment, RoleId};

/// PostgreSQL-backed store for roles, assignments and mirrored users.
#[derive(Clone)]
pub struct PostgresSecurityRepository {
    pool: PgPool,
}

impl PostgresSecurityRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_roles(&self, filter: RoleFilter<'_>) -> AppResult<Vec<Role>> {
        let (role_id, role_name, user_id) = match filter {
            RoleFilter::All => (None, None, None),
            RoleFilter::Id(role_id) => (Some(role_id.as_uuid()), None, None),
            RoleFilter::Name(name) => (None, Some(name), None),
            RoleFilter::AssignedTo(user_id) => (None, None, Some(user_id.as_uuid())),
        };

        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT
                roles.id AS role_id,
                roles.name AS role_name,
                roles.description,
                roles.is_system,
                grants.permission
            FROM roles
            LEFT JOIN role_permissions AS grants
                ON grants.role_id = roles.id
            WHERE ($1::UUID IS NULL OR roles.id = $1)
                AND ($2::TEXT IS NULL OR roles.name = $2)
                AND (
                    $3::UUID IS NULL
                    OR EXISTS (
                        SELECT 1
                        FROM user_roles
                        WHERE user_roles.role_id = roles.id
                            AND user_roles.user_id = $3
                    )
                )
            ORDER BY roles.name, grants.permission
            "#,
        )
        .bind(role_id)
        .bind(role_name)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load roles: {error}")))?;

        aggregate_roles(rows)
    }
}

enum RoleFilter<'a> {
    All,
    Id(RoleId),
    Name(&'a str),
    AssignedTo(UserId),
}

#[derive(Debug, FromRow)]
struct RoleRow {
    role_id: uuid::Uuid,
    role_name: String,
    description: Option<String>,
    is_system: bool,
    permission: Option<String>,
}

#[derive(Debug, FromRow)]
struct RoleAssignmentRow {
    user_id: uuid::Uuid,
    role_id: uuid::Uuid,
    assigned_by: Option<uuid::Uuid>,
    assigned_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: uuid::Uuid,
    email: String,
    legacy_role: String,
    tenant_id: uuid::Uuid,
}

#[async_trait]
impl RoleRepository for PostgresSecurityRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.fetch_roles(RoleFilter::All).await
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.fetch_roles(RoleFilter::Id(role_id)).await?.pop())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self.fetch_roles(RoleFilter::Name(name)).await?.pop())
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, is_system)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.name())
        .bind(role.description())
        .bind(role.is_system())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_role_conflict(error, role.name()))?;

        insert_permissions(&mut transaction, &role).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })
    }

    async fn update_role(&self, role: Role) -> AppResult<()> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE roles
            SET name = $2, description = $3
            WHERE id = $1
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(role.name())
        .bind(role.description())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_role_conflict(error, role.name()))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "role '{}' was not found",
                role.id()
            )));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role.id().as_uuid())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear role permissions: {error}"))
            })?;
        insert_permissions(&mut transaction, &role).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })
    }

    async fn delete_role(&self, role_id: RoleId) -> AppResult<()> {
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(role_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;

        Ok(())
    }
}

#[async_trait]
impl RoleAssignmentRepository for PostgresSecurityRepository {
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<Role>> {
        self.fetch_roles(RoleFilter::AssignedTo(user_id)).await
    }

    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            r#"
            SELECT user_id, role_id, assigned_by, assigned_at
            FROM user_roles
            ORDER BY assigned_at, user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role assignments: {error}")))?;

        Ok(rows
            .into_iter()
            .map(|row| RoleAssignment {
                user_id: UserId::from_uuid(row.user_id),
                role_id: RoleId::from_uuid(row.role_id),
                assigned_by: row.assigned_by.map(UserId::from_uuid),
                assigned_at: row.assigned_at,
            })
            .collect())
    }

    async fn grant_role(&self, assignment: RoleAssignment) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_by, assigned_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.assigned_by.map(|user_id| user_id.as_uuid()))
        .bind(assignment.assigned_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23503")
            {
                return AppError::NotFound(format!(
                    "user '{}' or role '{}' was not found",
                    assignment.user_id, assignment.role_id
                ));
            }

            AppError::Internal(format!("failed to grant role: {error}"))
        })?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn revoke_role(&self, user_id: UserId, role_id: RoleId) -> AppResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to revoke role: {error}")))?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> AppResult<u64> {
        Ok(sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to remove user assignments: {error}"))
            })?
            .rows_affected())
    }
}

#[async_trait]
impl UserDirectory for PostgresSecurityRepository {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, legacy_role, tenant_id
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user: {error}")))?;

        row.map(|row| {
            let legacy_role = LegacyRole::from_str(row.legacy_role.as_str()).map_err(|error| {
                AppError::Internal(format!(
                    "invalid stored legacy role for user '{}': {error}",
                    row.id
                ))
            })?;

            Ok(UserAccount {
                user_id: UserId::from_uuid(row.id),
                email: row.email,
                legacy_role,
                tenant_id: TenantId::from_uuid(row.tenant_id),
            })
        })
        .transpose()
    }

    async fn upsert_user(&self, user: UserAccount) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, legacy_role, tenant_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                legacy_role = EXCLUDED.legacy_role,
                tenant_id = EXCLUDED.tenant_id,
                updated_at = now()
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(user.legacy_role.as_str())
        .bind(user.tenant_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to upsert user: {error}")))?;

        Ok(())
    }
}

async fn insert_permissions(
    transaction: &mut Transaction<'_, Postgres>,
    role: &Role,
) -> AppResult<()> {
    for permission in role.permissions() {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission) DO NOTHING
            "#,
        )
        .bind(role.id().as_uuid())
        .bind(permission.as_str())
        .execute(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to persist role permissions: {error}")))?;
    }

    Ok(())
}

fn aggregate_roles(rows: Vec<RoleRow>) -> AppResult<Vec<Role>> {
    let mut order = Vec::new();
    let mut by_id: HashMap<uuid::Uuid, (RoleRow, Vec<Permission>)> = HashMap::new();

    for mut row in rows {
        let permission = row
            .permission
            .take()
            .map(|value| {
                Permission::from_str(value.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid stored permission '{value}' for role '{}': {error}",
                        row.role_name
                    ))
                })
            })
            .transpose()?;

        let role_id = row.role_id;
        let entry = by_id.entry(role_id).or_insert_with(|| {
            order.push(role_id);
            (row, Vec::new())
        });
        entry.1.extend(permission);
    }

    order
        .into_iter()
        .filter_map(|role_id| by_id.remove(&role_id))
        .map(|(row, permissions)| {
            Role::from_parts(
                RoleId::from_uuid(row.role_id),
                row.role_name,
                row.description,
                row.is_system,
                permissions,
            )
        })
        .collect()
}

fn map_role_conflict(error: sqlx::Error, role_name: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("role '{role_name}' already exists"));
    }

    AppError::Internal(format!("failed to persist role: {error}"))
}
