//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::db::{Store, UserRepository};
use crate::domain::UserId;
use crate::services::auth_service::{AuthError, AuthService, LoginResult, SessionUser};
use crate::services::lockout::{FailureOutcome, LockoutPolicy};
use crate::services::password::{PasswordDigest, PasswordHasher};
use crate::services::token::TokenIssuer;

pub struct SeaOrmAuthService {
    store: Store,
    hasher: Arc<PasswordHasher>,
    tokens: Arc<TokenIssuer>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
    /// Verified against when the username is unknown, so that path costs
    /// the same argon2 work as a wrong password.
    decoy: PasswordDigest,
}

const DECOY_PASSWORD: &str = "no-such-user-decoy-password";

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        hasher: Arc<PasswordHasher>,
        tokens: Arc<TokenIssuer>,
        policy: LockoutPolicy,
        clock: Arc<dyn Clock>,
        decoy: PasswordDigest,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            policy,
            clock,
            decoy,
        }
    }

    /// Hashes the decoy credential with the configured parameters.
    pub async fn decoy_digest(hasher: &PasswordHasher) -> anyhow::Result<PasswordDigest> {
        hasher.hash(DECOY_PASSWORD).await
    }

    /// Counts a failed password check. The increment is the first statement
    /// of the transaction, so concurrent failures serialize on the row and
    /// each sees the counter the previous one left.
    async fn record_failure(&self, id: UserId, username: &str) -> Result<AuthError, AuthError> {
        let now = self.clock.now();
        let txn = self.store.begin().await?;
        let users = UserRepository::new(&txn);

        let attempts = users.increment_login_attempts(id).await?;
        let outcome = self.policy.on_failure(attempts, now);
        if let FailureOutcome::Locked { until, .. } = outcome {
            users.lock_until(id, until).await?;
        }
        txn.commit().await?;

        metrics::counter!("auth_login_failures_total").increment(1);
        Ok(match outcome {
            FailureOutcome::Counted { attempts, remaining } => {
                info!(username, attempts, remaining, "Failed login");
                AuthError::InvalidCredentials {
                    remaining_attempts: Some(remaining),
                }
            }
            FailureOutcome::Locked { attempts, until } => {
                metrics::counter!("auth_lockouts_total").increment(1);
                warn!(username, attempts, locked_until = %until, "Account locked after failed logins");
                AuthError::AccountLocked {
                    locked_until: until,
                }
            }
        })
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError> {
        let Some(credentials) = self.store.users().find_by_username(username).await? else {
            self.hasher.verify(password, self.decoy.as_str()).await?;
            metrics::counter!("auth_login_failures_total").increment(1);
            info!(username, "Failed login for unknown user");
            return Err(AuthError::InvalidCredentials {
                remaining_attempts: Some(self.policy.max_attempts().saturating_sub(1)),
            });
        };

        let now = self.clock.now();
        if let Some(until) = credentials
            .locked_until
            .filter(|until| LockoutPolicy::is_locked(Some(*until), now))
        {
            info!(username, locked_until = %until, "Login rejected, account locked");
            return Err(AuthError::AccountLocked {
                locked_until: until,
            });
        }

        let id = credentials.user.id;
        if !self
            .hasher
            .verify(password, &credentials.password_hash)
            .await?
        {
            return Err(self.record_failure(id, username).await?);
        }

        let now = self.clock.now();
        self.store.users().record_login_success(id, now).await?;

        let mut user = credentials.user;
        user.last_login = Some(now);
        let (token, claims) = self.tokens.issue(&user, now)?;
        let expires_at = now + self.tokens.lifetime();

        info!(username, user_id = %id, iat = claims.iat, "Login successful");
        Ok(LoginResult {
            token,
            expires_at,
            user,
        })
    }

    fn verify_token(&self, token: &str) -> Result<SessionUser, AuthError> {
        let claims = self.tokens.verify(token, self.clock.now())?;
        SessionUser::try_from(claims)
    }
}
