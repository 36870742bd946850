#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use sea_orm::EntityTrait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use site_admin::clock::ManualClock;
use site_admin::config::Config;
use site_admin::domain::{OtpId, UserId};
use site_admin::entities::pending_actions;
use site_admin::models::{NewUser, Role, User};
use site_admin::services::{MemoryMailer, Outcome, OutgoingMail};
use site_admin::state::SharedState;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "Admin12345";
pub const APPROVER_EMAIL: &str = "approver@example.com";

pub struct TestApp {
    pub state: Arc<SharedState>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<MemoryMailer>,
    db_path: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.db_path.clone().into_os_string();
            path.push(suffix);
            std::fs::remove_file(path).ok();
        }
    }
}

pub fn test_config(db_path: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}?mode=rwc", db_path.display());
    config.security.argon2_memory_cost_kib = 256;
    config.security.argon2_time_cost = 1;
    config.security.jwt_secret = "integration-test-secret".to_string();
    config.approval.approver_email = APPROVER_EMAIL.to_string();
    config.bootstrap.admin_email = "admin@example.com".to_string();
    config.observability.metrics_enabled = false;
    config
}

pub async fn spawn() -> TestApp {
    let db_path = std::env::temp_dir().join(format!("site-admin-{}.db", uuid::Uuid::new_v4()));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let mailer = Arc::new(MemoryMailer::new());

    let state = SharedState::with_components(test_config(&db_path), clock.clone(), mailer.clone())
        .await
        .expect("Failed to create shared state");

    TestApp {
        state: Arc::new(state),
        clock,
        mailer,
        db_path,
    }
}

impl TestApp {
    pub async fn admin(&self) -> User {
        self.state
            .store
            .users()
            .find_by_username(ADMIN_USERNAME)
            .await
            .unwrap()
            .expect("bootstrap admin exists")
            .user
    }

    pub async fn create_regular_user(&self, username: &str, password: &str) -> User {
        let admin = self.admin().await;
        let outcome = self
            .state
            .user_service
            .create(admin.id, new_user(username, password, Role::User))
            .await
            .unwrap();
        match outcome {
            Outcome::Applied(user) => user,
            Outcome::Deferred(_) => panic!("regular user creation was deferred"),
        }
    }

    /// Reads a code straight from the ledger.
    pub async fn code_for(&self, otp_id: OtpId) -> String {
        pending_actions::Entity::find_by_id(otp_id.value())
            .one(&self.state.store.conn)
            .await
            .unwrap()
            .expect("ledger row exists")
            .code
    }

    pub async fn ledger_row(&self, otp_id: OtpId) -> pending_actions::Model {
        pending_actions::Entity::find_by_id(otp_id.value())
            .one(&self.state.store.conn)
            .await
            .unwrap()
            .expect("ledger row exists")
    }

    pub async fn user_row(&self, id: UserId) -> site_admin::entities::users::Model {
        site_admin::entities::users::Entity::find_by_id(id.value())
            .one(&self.state.store.conn)
            .await
            .unwrap()
            .expect("user row exists")
    }

    /// Waits for the background delivery task to hand a message over.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<OutgoingMail> {
        for _ in 0..200 {
            let sent = self.mailer.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} messages, got {}", self.mailer.sent().len());
    }
}

pub fn new_user(username: &str, password: &str, role: Role) -> NewUser {
    NewUser {
        username: username.to_string(),
        password: password.to_string(),
        role,
        email: format!("{username}@example.com"),
        first_name: None,
        last_name: None,
    }
}

/// Wrong code for `code`, still six digits.
pub fn wrong_code(code: &str) -> String {
    if code == "999999" {
        "100000".to_string()
    } else {
        "999999".to_string()
    }
}
