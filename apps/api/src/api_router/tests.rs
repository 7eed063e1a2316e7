use std::error::Error;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use async_trait::async_trait;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use taskgate_application::{AuditLogQuery, AuditWriterHandle, TaskRepository, TaskTransitionWrite};
use taskgate_core::{AppError, AppResult, LegacyRole, TenantId, UserId, UserIdentity};
use taskgate_domain::{
    AuditAction, AuditRecord, AuditStatus, RoleAssignment, SystemRole, Task, TaskId, TaskMessage,
    TrafficLight,
};
use tower::ServiceExt;

use super::build_router;
use crate::api_services::{StateParts, build_app_state, build_in_memory_parts};
use crate::error::INTERNAL_ERROR_MESSAGE;
use crate::middleware::{TENANT_ID_HEADER, USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};

type TestResult = Result<(), Box<dyn Error>>;

struct Harness {
    router: Router,
    writer: AuditWriterHandle,
    parts: StateParts,
    employee: UserIdentity,
    customer: UserIdentity,
}

impl Harness {
    async fn new() -> Result<Self, Box<dyn Error>> {
        Self::with_parts(build_in_memory_parts()).await
    }

    async fn with_parts(parts: StateParts) -> Result<Self, Box<dyn Error>> {
        let (state, writer) = build_app_state(parts.clone(), 64, Vec::new());
        state.security_admin_service.seed_system_roles().await?;
        let router = build_router(state, "http://localhost:3000")?;

        let tenant_id = TenantId::new();
        Ok(Self {
            router,
            writer,
            parts,
            employee: UserIdentity::new(
                UserId::new(),
                "clerk@taskgate.test",
                LegacyRole::Employee,
                tenant_id,
            ),
            customer: UserIdentity::new(
                UserId::new(),
                "owner@customer.test",
                LegacyRole::Customer,
                tenant_id,
            ),
        })
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        identity: Option<&UserIdentity>,
        body: Option<Value>,
    ) -> Result<Response, Box<dyn Error>> {
        send(&self.router, method, uri, identity, body).await
    }

    async fn create_task(&self, title: &str) -> Result<String, Box<dyn Error>> {
        let response = self
            .send(
                Method::POST,
                "/api/tasks",
                Some(&self.employee),
                Some(serde_json::json!({ "title": title })),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await?;
        Ok(body["task_id"].as_str().unwrap_or_default().to_owned())
    }

    async fn flushed_records(self) -> Result<Vec<AuditRecord>, Box<dyn Error>> {
        self.writer.shutdown().await;
        Ok(self
            .parts
            .audit_reader
            .list_records(AuditLogQuery {
                limit: 500,
                ..AuditLogQuery::default()
            })
            .await?)
    }
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    identity: Option<&UserIdentity>,
    body: Option<Value>,
) -> Result<Response, Box<dyn Error>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(identity) = identity {
        builder = builder
            .header(USER_ID_HEADER, identity.user_id().to_string())
            .header(USER_EMAIL_HEADER, identity.email())
            .header(USER_ROLE_HEADER, identity.legacy_role().as_str())
            .header(TENANT_ID_HEADER, identity.tenant_id().to_string());
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    Ok(router.clone().oneshot(request).await?)
}

async fn json_body(response: Response) -> Result<Value, Box<dyn Error>> {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn health_is_public() -> TestResult {
    let harness = Harness::new().await?;

    let response = harness.send(Method::GET, "/health", None, None).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn anonymous_requests_are_rejected_without_an_audit_record() -> TestResult {
    let harness = Harness::new().await?;

    let response = harness.send(Method::GET, "/api/tasks", None, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let records = harness.flushed_records().await?;
    assert!(records.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_identity_headers_are_unauthorized() -> TestResult {
    let harness = Harness::new().await?;
    let request = Request::builder()
        .uri("/api/tasks")
        .header(USER_ID_HEADER, "not-a-uuid")
        .header(USER_EMAIL_HEADER, "someone@taskgate.test")
        .header(USER_ROLE_HEADER, "employee")
        .header(TENANT_ID_HEADER, TenantId::new().to_string())
        .body(Body::empty())?;

    let response = harness.router.clone().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn task_moves_through_its_lifecycle_over_http() -> TestResult {
    let harness = Harness::new().await?;
    let task_id = harness.create_task("Quarterly VAT return").await?;

    let submitted = harness
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/submit"),
            Some(&harness.customer),
            None,
        )
        .await?;
    assert_eq!(submitted.status(), StatusCode::OK);
    assert_eq!(json_body(submitted).await?["status"], "submitted");

    let completed = harness
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/complete"),
            Some(&harness.employee),
            None,
        )
        .await?;
    assert_eq!(completed.status(), StatusCode::OK);
    let body = json_body(completed).await?;
    assert_eq!(body["status"], "completed");
    assert_eq!(
        body["completed_by"],
        Value::String(harness.employee.user_id().to_string())
    );

    let employee_id = harness.employee.user_id();
    let records = harness.flushed_records().await?;
    let lifecycle: Vec<&AuditRecord> = records
        .iter()
        .filter(|record| record.entity_id.as_deref() == Some(task_id.as_str()))
        .filter(|record| matches!(record.action, AuditAction::Submit | AuditAction::Complete))
        .collect();
    assert_eq!(lifecycle.len(), 2);
    assert!(lifecycle.iter().all(|record| record.status == AuditStatus::Success));
    assert!(lifecycle.iter().any(|record| {
        record.action == AuditAction::Complete && record.actor_user_id == Some(employee_id)
    }));
    Ok(())
}

#[tokio::test]
async fn customer_completion_is_forbidden_and_recorded_once() -> TestResult {
    let harness = Harness::new().await?;
    let task_id = harness.create_task("Payroll documents").await?;
    let submitted = harness
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/submit"),
            Some(&harness.customer),
            None,
        )
        .await?;
    assert_eq!(submitted.status(), StatusCode::OK);

    let response = harness
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/complete"),
            Some(&harness.customer),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let current = harness
        .send(
            Method::GET,
            &format!("/api/tasks/{task_id}"),
            Some(&harness.employee),
            None,
        )
        .await?;
    assert_eq!(json_body(current).await?["status"], "submitted");

    let records = harness.flushed_records().await?;
    let completions: Vec<&AuditRecord> = records
        .iter()
        .filter(|record| record.action == AuditAction::Complete)
        .collect();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].status, AuditStatus::Failed);
    assert_eq!(completions[0].entity_id.as_deref(), Some(task_id.as_str()));
    assert!(completions[0].error_message.is_some());
    assert_eq!(
        completions[0].metadata.get("status_code"),
        Some(&Value::from(403))
    );
    Ok(())
}

#[tokio::test]
async fn return_without_reason_is_a_validation_error() -> TestResult {
    let harness = Harness::new().await?;
    let task_id = harness.create_task("Annual statement").await?;
    harness
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/submit"),
            Some(&harness.customer),
            None,
        )
        .await?;

    let response = harness
        .send(
            Method::POST,
            &format!("/api/tasks/{task_id}/return"),
            Some(&harness.employee),
            Some(serde_json::json!({ "reason": "   " })),
        )
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn audit_log_requires_permission_and_supports_filters() -> TestResult {
    let harness = Harness::new().await?;
    let administrator = UserIdentity::new(
        UserId::new(),
        "admin@taskgate.test",
        LegacyRole::Employee,
        harness.employee.tenant_id(),
    );
    let Some(admin_role) = harness
        .parts
        .roles
        .find_role_by_name(SystemRole::Administrator.name())
        .await?
    else {
        panic!("administrator role should be seeded");
    };
    harness
        .parts
        .assignments
        .grant_role(RoleAssignment {
            user_id: administrator.user_id(),
            role_id: admin_role.id(),
            assigned_by: None,
            assigned_at: Utc::now(),
        })
        .await?;

    harness.create_task("Open balance check").await?;

    let denied = harness
        .send(Method::GET, "/api/audit-records", Some(&harness.employee), None)
        .await?;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    // Flush the trail; requests after shutdown are served but no longer recorded.
    let Harness { router, writer, .. } = harness;
    writer.shutdown().await;

    let listed = send(
        &router,
        Method::GET,
        "/api/audit-records?entity_type=task&action=create",
        Some(&administrator),
        None,
    )
    .await?;
    assert_eq!(listed.status(), StatusCode::OK);

    let body = json_body(listed).await?;
    let Some(records) = body.as_array() else {
        panic!("audit listing should be an array");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["action"], "CREATE");
    assert_eq!(records[0]["status"], "success");
    assert_eq!(records[0]["actor_email"], "clerk@taskgate.test");
    Ok(())
}

const STORAGE_FAILURE: &str =
    "failed to insert task: password authentication failed for user \"taskgate\" at 10.0.3.7:5432";

/// Task store whose connection is gone.
struct UnreachableTaskRepository;

#[async_trait]
impl TaskRepository for UnreachableTaskRepository {
    async fn insert_task(&self, _task: Task) -> AppResult<()> {
        Err(AppError::Internal(STORAGE_FAILURE.to_owned()))
    }

    async fn find_task(&self, _task_id: TaskId) -> AppResult<Option<Task>> {
        Err(AppError::Internal(STORAGE_FAILURE.to_owned()))
    }

    async fn list_tasks(&self, _tenant_id: Option<TenantId>) -> AppResult<Vec<Task>> {
        Err(AppError::Internal(STORAGE_FAILURE.to_owned()))
    }

    async fn compare_and_set_state(&self, _write: TaskTransitionWrite) -> AppResult<Task> {
        Err(AppError::Internal(STORAGE_FAILURE.to_owned()))
    }

    async fn list_task_messages(&self, _task_id: TaskId) -> AppResult<Vec<TaskMessage>> {
        Err(AppError::Internal(STORAGE_FAILURE.to_owned()))
    }

    async fn update_cached_traffic_lights(
        &self,
        _updates: Vec<(TaskId, TrafficLight)>,
    ) -> AppResult<u64> {
        Err(AppError::Internal(STORAGE_FAILURE.to_owned()))
    }
}

#[tokio::test]
async fn internal_errors_hide_storage_details_from_clients_but_not_the_trail() -> TestResult {
    let mut parts = build_in_memory_parts();
    parts.tasks = Arc::new(UnreachableTaskRepository);
    let harness = Harness::with_parts(parts).await?;

    let response = harness
        .send(
            Method::POST,
            "/api/tasks",
            Some(&harness.employee),
            Some(serde_json::json!({ "title": "Opening balance" })),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let bytes = to_bytes(response.into_body(), 1024 * 1024).await?;
    let body = String::from_utf8(bytes.to_vec())?;
    assert!(!body.contains("10.0.3.7"));
    assert!(!body.contains("password"));
    let body: Value = serde_json::from_str(&body)?;
    assert_eq!(body["message"], INTERNAL_ERROR_MESSAGE);

    let records = harness.flushed_records().await?;
    let Some(record) = records
        .iter()
        .find(|record| record.action == AuditAction::Create)
    else {
        panic!("the failed creation should be audited");
    };
    assert_eq!(record.status, AuditStatus::Error);
    assert!(
        record
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("10.0.3.7:5432"))
    );
    Ok(())
}
