mod common;

use chrono::Duration;
use sea_orm::{EntityTrait, PaginatorTrait};

use site_admin::clock::Clock;
use site_admin::entities::pending_actions;
use site_admin::models::{ActionType, PendingHandle, Role, UserChanges};
use site_admin::services::{Outcome, UserError};

use common::{APPROVER_EMAIL, TestApp, new_user, spawn, wrong_code};

fn deferred<T: std::fmt::Debug>(outcome: Outcome<T>) -> PendingHandle {
    match outcome {
        Outcome::Deferred(handle) => handle,
        Outcome::Applied(value) => panic!("expected a deferred outcome, got {value:?}"),
    }
}

async fn ledger_len(app: &TestApp) -> u64 {
    pending_actions::Entity::find()
        .count(&app.state.store.conn)
        .await
        .unwrap()
}

async fn request_admin(app: &TestApp, username: &str) -> PendingHandle {
    let admin = app.admin().await;
    deferred(
        app.state
            .user_service
            .create(admin.id, new_user(username, "CarolPass1", Role::Admin))
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn admin_creation_waits_for_the_code() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;

    assert_eq!(handle.action_type, ActionType::CreateAdmin);
    assert_eq!(handle.expires_at, app.clock.now() + Duration::minutes(10));
    assert!(app.state.store.users().find_by_username("carol").await.unwrap().is_none());

    let code = app.code_for(handle.otp_id).await;
    let created = app
        .state
        .user_service
        .verify_create_admin(handle.otp_id, &code)
        .await
        .unwrap();
    assert_eq!(created.username, "carol");
    assert_eq!(created.role, Role::Admin);

    let row = app.ledger_row(handle.otp_id).await;
    assert!(row.consumed);
    assert_eq!(row.consumed_at, Some(app.clock.now()));

    // The new admin can log in with the password from the original request.
    app.state.auth_service.login("carol", "CarolPass1").await.unwrap();

    assert!(matches!(
        app.state
            .user_service
            .verify_create_admin(handle.otp_id, &code)
            .await,
        Err(UserError::InvalidOrExpiredCode)
    ));
}

#[tokio::test]
async fn code_is_mailed_to_the_approver() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;

    let sent = app.wait_for_mail(1).await;
    assert_eq!(sent[0].to, APPROVER_EMAIL);
    assert!(sent[0].subject.ends_with("Admin Verification Code"));
    assert!(sent[0].html.contains(&code));

    let row = app.ledger_row(handle.otp_id).await;
    assert_eq!(row.recipient, APPROVER_EMAIL);
    assert_eq!(row.action_type, "create_admin");
}

#[tokio::test]
async fn failed_delivery_keeps_the_code_valid() {
    let app = spawn().await;
    app.mailer.fail_deliveries(true);

    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;

    app.state
        .user_service
        .verify_create_admin(handle.otp_id, &code)
        .await
        .unwrap();
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn expired_code_is_rejected_and_left_unconsumed() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;

    app.clock.advance(Duration::minutes(10) + Duration::seconds(1));
    assert!(matches!(
        app.state
            .user_service
            .verify_create_admin(handle.otp_id, &code)
            .await,
        Err(UserError::InvalidOrExpiredCode)
    ));

    assert!(!app.ledger_row(handle.otp_id).await.consumed);
    assert!(app.state.store.users().find_by_username("carol").await.unwrap().is_none());
}

#[tokio::test]
async fn code_is_still_valid_just_before_expiry() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;

    app.clock.advance(Duration::minutes(10) - Duration::seconds(1));
    app.state
        .user_service
        .verify_create_admin(handle.otp_id, &code)
        .await
        .unwrap();
}

#[tokio::test]
async fn wrong_code_does_not_consume_the_entry() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;
    let service = &app.state.user_service;

    assert!(matches!(
        service
            .verify_create_admin(handle.otp_id, &wrong_code(&code))
            .await,
        Err(UserError::InvalidOrExpiredCode)
    ));
    assert!(!app.ledger_row(handle.otp_id).await.consumed);

    service.verify_create_admin(handle.otp_id, &code).await.unwrap();
}

#[tokio::test]
async fn entry_lookup_requires_the_matching_code() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;
    let ledger = app.state.store.pending_actions();

    // Verification resolves the payload through this lookup before hashing
    // anything, so a wrong code never reaches the password hasher.
    let miss = ledger
        .find_matching(handle.otp_id, &wrong_code(&code), ActionType::CreateAdmin)
        .await
        .unwrap();
    assert!(miss.is_none());

    let miss = ledger
        .find_matching(handle.otp_id, &code, ActionType::UpdateAdminPassword)
        .await
        .unwrap();
    assert!(miss.is_none());

    let entry = ledger
        .find_matching(handle.otp_id, &code, ActionType::CreateAdmin)
        .await
        .unwrap()
        .expect("entry matches its own code");
    assert_eq!(entry.id, handle.otp_id);
    assert_eq!(entry.recipient, APPROVER_EMAIL);
    assert!(entry.is_open(app.clock.now()));
}

#[tokio::test]
async fn code_cannot_be_spent_on_another_action_type() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;
    let service = &app.state.user_service;

    assert!(matches!(
        service.verify_update_admin(handle.otp_id, &code).await,
        Err(UserError::InvalidOrExpiredCode)
    ));
    assert!(matches!(
        service
            .verify_update_admin_password(handle.otp_id, &code)
            .await,
        Err(UserError::InvalidOrExpiredCode)
    ));
    assert!(!app.ledger_row(handle.otp_id).await.consumed);
}

#[tokio::test]
async fn unknown_otp_id_is_rejected() {
    let app = spawn().await;
    assert!(matches!(
        app.state
            .user_service
            .verify_create_admin(site_admin::domain::OtpId::new(4242), "123456")
            .await,
        Err(UserError::InvalidOrExpiredCode)
    ));
}

#[tokio::test]
async fn concurrent_verifications_apply_once() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;

    let attempts: Vec<_> = (0..4)
        .map(|_| {
            let service = app.state.user_service.clone();
            let code = code.clone();
            tokio::spawn(async move { service.verify_create_admin(handle.otp_id, &code).await })
        })
        .collect();

    let mut applied = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => applied += 1,
            Err(UserError::InvalidOrExpiredCode) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn duplicate_admin_is_rejected_before_deferral() {
    let app = spawn().await;
    let admin = app.admin().await;
    app.create_regular_user("carol", "CarolPass1").await;

    let result = app
        .state
        .user_service
        .create(admin.id, new_user("carol", "CarolPass1", Role::Admin))
        .await;
    assert!(matches!(result, Err(UserError::DuplicateUsername)));

    let mut other = new_user("dave", "DavePass12", Role::Admin);
    other.email = "CAROL@example.com".to_string();
    let result = app.state.user_service.create(admin.id, other).await;
    assert!(matches!(result, Err(UserError::DuplicateEmail)));

    assert_eq!(ledger_len(&app).await, 0);
}

#[tokio::test]
async fn username_taken_between_request_and_verify_rolls_back() {
    let app = spawn().await;
    let handle = request_admin(&app, "carol").await;
    let code = app.code_for(handle.otp_id).await;

    app.create_regular_user("carol", "CarolPass1").await;

    assert!(matches!(
        app.state
            .user_service
            .verify_create_admin(handle.otp_id, &code)
            .await,
        Err(UserError::DuplicateUsername)
    ));
    assert!(!app.ledger_row(handle.otp_id).await.consumed);
}

#[tokio::test]
async fn regular_user_changes_apply_directly() {
    let app = spawn().await;
    let admin = app.admin().await;
    let bob = app.create_regular_user("bob", "BobPassw0rd").await;

    let outcome = app
        .state
        .user_service
        .update(
            admin.id,
            bob.id,
            UserChanges {
                first_name: Some("Bob".into()),
                ..UserChanges::default()
            },
        )
        .await
        .unwrap();
    match outcome {
        Outcome::Applied(user) => assert_eq!(user.first_name.as_deref(), Some("Bob")),
        Outcome::Deferred(_) => panic!("regular user update was deferred"),
    }
    assert_eq!(ledger_len(&app).await, 0);
}

#[tokio::test]
async fn promotion_to_admin_is_deferred() {
    let app = spawn().await;
    let admin = app.admin().await;
    let bob = app.create_regular_user("bob", "BobPassw0rd").await;
    let service = &app.state.user_service;

    let handle = deferred(
        service
            .update(
                admin.id,
                bob.id,
                UserChanges {
                    role: Some(Role::Admin),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap(),
    );
    assert_eq!(handle.action_type, ActionType::UpdateAdmin);
    assert_eq!(service.get(bob.id).await.unwrap().role, Role::User);

    let code = app.code_for(handle.otp_id).await;
    let promoted = service.verify_update_admin(handle.otp_id, &code).await.unwrap();
    assert_eq!(promoted.role, Role::Admin);
}

#[tokio::test]
async fn admin_edits_are_deferred_then_applied() {
    let app = spawn().await;
    let admin = app.admin().await;
    let service = &app.state.user_service;

    let handle = deferred(
        service
            .update(
                admin.id,
                admin.id,
                UserChanges {
                    last_name: Some("Operator".into()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap(),
    );
    assert_eq!(
        service.get(admin.id).await.unwrap().last_name.as_deref(),
        Some("Administrator")
    );

    let code = app.code_for(handle.otp_id).await;
    let updated = service.verify_update_admin(handle.otp_id, &code).await.unwrap();
    assert_eq!(updated.last_name.as_deref(), Some("Operator"));
}

#[tokio::test]
async fn admin_password_reset_is_deferred() {
    let app = spawn().await;
    let admin = app.admin().await;
    let service = &app.state.user_service;

    let handle = deferred(
        service
            .reset_password(admin.id, admin.id, "NewAdmin123".to_string())
            .await
            .unwrap(),
    );
    assert_eq!(handle.action_type, ActionType::UpdateAdminPassword);

    // Old password still works until the code is verified.
    app.state
        .auth_service
        .login("admin", common::ADMIN_PASSWORD)
        .await
        .unwrap();

    let code = app.code_for(handle.otp_id).await;
    service
        .verify_update_admin_password(handle.otp_id, &code)
        .await
        .unwrap();

    assert!(app
        .state
        .auth_service
        .login("admin", common::ADMIN_PASSWORD)
        .await
        .is_err());
    app.state
        .auth_service
        .login("admin", "NewAdmin123")
        .await
        .unwrap();
}

#[tokio::test]
async fn admin_own_password_change_checks_current_password_first() {
    let app = spawn().await;
    let admin = app.admin().await;
    let service = &app.state.user_service;

    assert!(matches!(
        service
            .change_own_password(admin.id, "WrongPass1", "NewAdmin123".to_string())
            .await,
        Err(UserError::CurrentPasswordIncorrect)
    ));
    assert_eq!(ledger_len(&app).await, 0);

    let outcome = service
        .change_own_password(admin.id, common::ADMIN_PASSWORD, "NewAdmin123".to_string())
        .await
        .unwrap();
    assert!(outcome.is_deferred());
}

#[tokio::test]
async fn regular_user_changes_own_password_directly() {
    let app = spawn().await;
    let bob = app.create_regular_user("bob", "BobPassw0rd").await;

    let outcome = app
        .state
        .user_service
        .change_own_password(bob.id, "BobPassw0rd", "BobNewPass1".to_string())
        .await
        .unwrap();
    assert!(!outcome.is_deferred());
    app.state
        .auth_service
        .login("bob", "BobNewPass1")
        .await
        .unwrap();
}

#[tokio::test]
async fn profile_edit_cannot_change_role() {
    let app = spawn().await;
    let bob = app.create_regular_user("bob", "BobPassw0rd").await;

    let result = app
        .state
        .user_service
        .update_profile(
            bob.id,
            UserChanges {
                role: Some(Role::Admin),
                ..UserChanges::default()
            },
        )
        .await;
    assert!(matches!(result, Err(UserError::NoChangesSubmitted)));
    assert_eq!(ledger_len(&app).await, 0);
}

#[tokio::test]
async fn empty_update_is_rejected() {
    let app = spawn().await;
    let admin = app.admin().await;
    let bob = app.create_regular_user("bob", "BobPassw0rd").await;

    assert!(matches!(
        app.state
            .user_service
            .update(admin.id, bob.id, UserChanges::default())
            .await,
        Err(UserError::NoChangesSubmitted)
    ));
}

#[tokio::test]
async fn self_deletion_is_forbidden() {
    let app = spawn().await;
    let admin = app.admin().await;

    assert!(matches!(
        app.state.user_service.delete(admin.id, admin.id).await,
        Err(UserError::SelfDeletionForbidden)
    ));
    assert!(app.user_row(admin.id).await.is_active);
}

#[tokio::test]
async fn soft_deleted_username_stays_taken() {
    let app = spawn().await;
    let admin = app.admin().await;
    let bob = app.create_regular_user("bob", "BobPassw0rd").await;
    let service = &app.state.user_service;

    service.delete(admin.id, bob.id).await.unwrap();
    assert!(!app.user_row(bob.id).await.is_active);
    assert!(matches!(service.get(bob.id).await, Err(UserError::UserNotFound)));
    assert!(service.list().await.unwrap().iter().all(|u| u.id != bob.id));

    assert!(matches!(
        service
            .create(admin.id, new_user("bob", "BobPassw0rd", Role::User))
            .await,
        Err(UserError::DuplicateUsername)
    ));
    assert!(matches!(
        service.delete(admin.id, bob.id).await,
        Err(UserError::UserNotFound)
    ));
}
