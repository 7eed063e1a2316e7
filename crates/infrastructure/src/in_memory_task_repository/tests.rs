use std::sync::Arc;

use chrono::Utc;
use taskgate_application::{TaskRepository, TaskTransitionWrite};
use taskgate_core::{AppError, TenantId, UserId};
use taskgate_domain::{Task, TaskMessage, TaskState, TaskStatus};

use super::InMemoryTaskRepository;

fn task(tenant_id: TenantId, title: &str) -> Task {
    match Task::new(tenant_id, title, Utc::now()) {
        Ok(task) => task,
        Err(error) => panic!("invalid test task: {error}"),
    }
}

#[tokio::test]
async fn list_is_scoped_by_tenant() {
    let repository = InMemoryTaskRepository::new();
    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();
    assert!(repository.insert_task(task(tenant_a, "A")).await.is_ok());
    assert!(repository.insert_task(task(tenant_b, "B")).await.is_ok());

    assert_eq!(repository.list_tasks(Some(tenant_a)).await.unwrap_or_default().len(), 1);
    assert_eq!(repository.list_tasks(None).await.unwrap_or_default().len(), 2);
}

#[tokio::test]
async fn stale_expected_status_conflicts_without_writing() {
    let repository = InMemoryTaskRepository::new();
    let stored = task(TenantId::new(), "Filing");
    assert!(repository.insert_task(stored.clone()).await.is_ok());

    let result = repository
        .compare_and_set_state(TaskTransitionWrite {
            task_id: stored.id(),
            expected_status: TaskStatus::Submitted,
            next_state: TaskState::Open,
            message: Some(TaskMessage::new(stored.id(), UserId::new(), "stale", Utc::now())),
        })
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(repository
        .list_task_messages(stored.id())
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_with_the_same_expectation_have_one_winner() {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let stored = task(TenantId::new(), "Race");
    assert!(repository.insert_task(stored.clone()).await.is_ok());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repository = repository.clone();
            let task_id = stored.id();
            tokio::spawn(async move {
                repository
                    .compare_and_set_state(TaskTransitionWrite {
                        task_id,
                        expected_status: TaskStatus::Open,
                        next_state: TaskState::Submitted,
                        message: None,
                    })
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if matches!(handle.await, Ok(Ok(_))) {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
