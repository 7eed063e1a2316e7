use std::sync::Arc;

use taskgate_core::{AppError, LegacyRole, TenantId, UserId, UserIdentity};
use taskgate_domain::{Permission, Role, SystemRole};

use crate::test_support::{FakeSecurityStore, authorization_service};
use crate::{CreateRoleInput, RoleRepository, SecurityAdminService, UpdateRoleInput};

struct Fixture {
    store: Arc<FakeSecurityStore>,
    service: SecurityAdminService,
    admin: UserIdentity,
}

async fn fixture() -> Fixture {
    let store = Arc::new(FakeSecurityStore::default());
    let service = SecurityAdminService::new(
        authorization_service(&store),
        store.clone(),
        store.clone(),
        store.clone(),
    );
    let admin = store
        .add_user_with_permissions(
            LegacyRole::Employee,
            TenantId::new(),
            &[Permission::ManageRoles, Permission::ManageUsers],
        )
        .await;

    Fixture {
        store,
        service,
        admin,
    }
}

fn create_input(name: &str, permissions: &[&str]) -> CreateRoleInput {
    CreateRoleInput {
        name: name.to_owned(),
        description: None,
        permissions: permissions.iter().map(|value| (*value).to_owned()).collect(),
    }
}

#[tokio::test]
async fn create_role_requires_manage_roles() {
    let fixture = fixture().await;
    let customer = fixture
        .store
        .add_user(LegacyRole::Customer, fixture.admin.tenant_id())
        .await;

    let result = fixture
        .service
        .create_role(&customer, create_input("auditors", &["view_audit_log"]))
        .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn duplicate_role_name_is_a_conflict() {
    let fixture = fixture().await;

    let first = fixture
        .service
        .create_role(&fixture.admin, create_input("auditors", &["view_audit_log"]))
        .await;
    assert!(first.is_ok());

    let second = fixture
        .service
        .create_role(&fixture.admin, create_input("auditors", &[]))
        .await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn unknown_permission_key_is_rejected_without_writing() {
    let fixture = fixture().await;
    let roles_before = fixture.store.roles.lock().await.len();

    let result = fixture
        .service
        .create_role(&fixture.admin, create_input("ops", &["view_task", "root"]))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(fixture.store.roles.lock().await.len(), roles_before);
}

#[tokio::test]
async fn replace_permissions_swaps_the_whole_set() {
    let fixture = fixture().await;
    let role = fixture
        .service
        .create_role(&fixture.admin, create_input("ops", &["view_task", "edit_task"]))
        .await;
    assert!(role.is_ok());
    let Ok(role) = role else { return };

    let replaced = fixture
        .service
        .replace_role_permissions(&fixture.admin, role.id(), &["complete_task".to_owned()])
        .await;
    assert!(replaced.is_ok());

    let stored = fixture.store.find_role(role.id()).await.ok().flatten();
    assert_eq!(
        stored.map(|role| role.permissions().iter().copied().collect::<Vec<_>>()),
        Some(vec![Permission::CompleteTask])
    );

    let invalid = fixture
        .service
        .replace_role_permissions(&fixture.admin, role.id(), &["nope".to_owned()])
        .await;
    assert!(matches!(invalid, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn system_roles_cannot_be_renamed_or_deleted() {
    let fixture = fixture().await;
    assert!(matches!(fixture.service.seed_system_roles().await, Ok(3)));
    assert!(matches!(fixture.service.seed_system_roles().await, Ok(0)));

    let employee = fixture
        .store
        .find_role_by_name(SystemRole::Employee.name())
        .await
        .ok()
        .flatten();
    assert!(employee.is_some());
    let Some(employee) = employee else { return };

    let rename = fixture
        .service
        .update_role(
            &fixture.admin,
            employee.id(),
            UpdateRoleInput {
                name: Some("staff".to_owned()),
                ..UpdateRoleInput::default()
            },
        )
        .await;
    assert!(matches!(rename, Err(AppError::Validation(_))));

    let describe = fixture
        .service
        .update_role(
            &fixture.admin,
            employee.id(),
            UpdateRoleInput {
                description: Some("Back office".to_owned()),
                permissions: Some(vec!["view_task".to_owned()]),
                ..UpdateRoleInput::default()
            },
        )
        .await;
    assert!(describe.is_ok());

    let delete = fixture.service.delete_role(&fixture.admin, employee.id()).await;
    assert!(matches!(delete, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn deleting_a_role_cascades_assignments() {
    let fixture = fixture().await;
    let member = fixture
        .store
        .add_user(LegacyRole::Customer, fixture.admin.tenant_id())
        .await;
    let role = fixture
        .service
        .create_role(&fixture.admin, create_input("reviewers", &["return_task"]))
        .await;
    let Ok(role) = role else {
        panic!("role creation failed");
    };

    assert!(
        fixture
            .service
            .grant_role(&fixture.admin, member.user_id(), role.id())
            .await
            .is_ok()
    );
    assert!(fixture.service.delete_role(&fixture.admin, role.id()).await.is_ok());

    let remaining = fixture
        .store
        .assignments
        .lock()
        .await
        .iter()
        .filter(|assignment| assignment.role_id == role.id())
        .count();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn grant_and_revoke_are_idempotent() {
    let fixture = fixture().await;
    let member = fixture
        .store
        .add_user(LegacyRole::Customer, fixture.admin.tenant_id())
        .await;
    let role = fixture
        .service
        .create_role(&fixture.admin, create_input("reviewers", &["return_task"]))
        .await;
    let Ok(role) = role else {
        panic!("role creation failed");
    };

    for _ in 0..2 {
        let granted = fixture
            .service
            .grant_role(&fixture.admin, member.user_id(), role.id())
            .await;
        assert!(granted.is_ok());
    }

    let count_for_member = |assignments: &[taskgate_domain::RoleAssignment]| {
        assignments
            .iter()
            .filter(|assignment| assignment.user_id == member.user_id())
            .count()
    };
    assert_eq!(count_for_member(&fixture.store.assignments.lock().await), 1);

    for _ in 0..2 {
        let revoked = fixture
            .service
            .revoke_role(&fixture.admin, member.user_id(), role.id())
            .await;
        assert!(revoked.is_ok());
    }
    assert_eq!(count_for_member(&fixture.store.assignments.lock().await), 0);
}

#[tokio::test]
async fn granting_to_unknown_user_is_not_found() {
    let fixture = fixture().await;
    let role = Role::new("temp", None, [Permission::ViewTask]);
    let Ok(role) = role else {
        panic!("role construction failed");
    };
    assert!(fixture.store.insert_role(role.clone()).await.is_ok());

    let result = fixture
        .service
        .grant_role(&fixture.admin, UserId::new(), role.id())
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn users_can_read_their_own_roles_only() {
    let fixture = fixture().await;
    let customer = fixture
        .store
        .add_user(LegacyRole::Customer, fixture.admin.tenant_id())
        .await;

    let own = fixture
        .service
        .user_roles(&customer, customer.user_id())
        .await;
    assert!(own.is_ok());

    let other = fixture
        .service
        .user_roles(&customer, fixture.admin.user_id())
        .await;
    assert!(matches!(other, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn user_deletion_removes_every_assignment() {
    let fixture = fixture().await;
    let removed = fixture
        .service
        .remove_user_assignments(&fixture.admin, fixture.admin.user_id())
        .await;
    assert!(matches!(removed, Ok(1)));
}

#[tokio::test]
async fn synchronized_identities_can_receive_grants() {
    let fixture = fixture().await;
    let newcomer = UserIdentity::new(
        UserId::new(),
        "newcomer@example.test",
        LegacyRole::Customer,
        fixture.admin.tenant_id(),
    );
    let role = Role::new("reviewers", None, [Permission::ViewTask]);
    let Ok(role) = role else {
        panic!("role construction failed");
    };
    assert!(fixture.store.insert_role(role.clone()).await.is_ok());

    assert!(fixture.service.sync_user(&newcomer).await.is_ok());
    assert!(fixture.service.sync_user(&newcomer).await.is_ok());
    let stored = fixture
        .store
        .users
        .lock()
        .await
        .iter()
        .filter(|user| user.user_id == newcomer.user_id())
        .count();
    assert_eq!(stored, 1);

    let granted = fixture
        .service
        .grant_role(&fixture.admin, newcomer.user_id(), role.id())
        .await;
    assert!(granted.is_ok());
}
