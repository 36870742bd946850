use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::Store;
use crate::models::{NewUser, Role};
use crate::services::mailer::{self, Mailer};
use crate::services::{
    AuthService, LockoutPolicy, PasswordHasher, PrivilegedActions, SeaOrmAuthService,
    SeaOrmUserService, TokenIssuer, UserService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub clock: Arc<dyn Clock>,

    pub auth_service: Arc<dyn AuthService>,

    pub user_service: Arc<dyn UserService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer = mailer::from_config(&config.smtp)?;
        Self::with_components(config, Arc::new(SystemClock), mailer).await
    }

    /// Wires every service over a fresh store. Tests inject their own clock
    /// and mailer here.
    pub async fn with_components(
        config: Config,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let hasher = Arc::new(PasswordHasher::from_config(&config.security)?);
        let tokens = Arc::new(TokenIssuer::new(
            &token_secret(&config),
            Duration::hours(config.security.token_expiry_hours),
        ));

        bootstrap_admin(&store, &hasher, &config, clock.as_ref()).await?;

        let privileged = Arc::new(PrivilegedActions::new(
            store.clone(),
            hasher.clone(),
            mailer,
            clock.clone(),
            &config.approval,
            config.smtp.from_name.clone(),
        ));

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            hasher.clone(),
            tokens,
            LockoutPolicy::from_config(&config.security.lockout),
            clock.clone(),
            SeaOrmAuthService::decoy_digest(&hasher).await?,
        )) as Arc<dyn AuthService>;

        let user_service = Arc::new(SeaOrmUserService::new(
            store.clone(),
            hasher,
            privileged,
            clock.clone(),
        )) as Arc<dyn UserService>;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            clock,
            auth_service,
            user_service,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}

fn token_secret(config: &Config) -> Vec<u8> {
    if config.security.jwt_secret.is_empty() {
        warn!("No JWT secret configured; generated an ephemeral one, tokens will not survive a restart");
        let mut secret = [0u8; 32];
        rand::rng().fill(&mut secret);
        secret.to_vec()
    } else {
        config.security.jwt_secret.as_bytes().to_vec()
    }
}

/// Creates the configured administrator when no active admin exists.
async fn bootstrap_admin(
    store: &Store,
    hasher: &PasswordHasher,
    config: &Config,
    clock: &dyn Clock,
) -> anyhow::Result<()> {
    let users = store.users();
    if users.count_active_admins().await? > 0 {
        return Ok(());
    }

    let boot = &config.bootstrap;
    if boot.admin_password.is_empty() {
        warn!("No admin account exists and no bootstrap password is configured");
        return Ok(());
    }
    if users.username_exists(&boot.admin_username, None).await?
        || users.email_exists(&boot.admin_email, None).await?
    {
        warn!(
            username = %boot.admin_username,
            "No active admin exists but the bootstrap username or email is taken"
        );
        return Ok(());
    }

    let admin = NewUser {
        username: boot.admin_username.clone(),
        password: boot.admin_password.clone(),
        role: Role::Admin,
        email: boot.admin_email.clone(),
        first_name: Some(boot.first_name.clone()).filter(|s| !s.is_empty()),
        last_name: Some(boot.last_name.clone()).filter(|s| !s.is_empty()),
    };
    let digest = hasher.hash(&admin.password).await?;
    let created = users.create(&admin, digest, clock.now()).await?;

    info!(user_id = %created.id, username = %created.username, "Bootstrap admin created");
    Ok(())
}
