//! Two-phase approval for mutations that touch admin accounts.
//!
//! `defer` records the mutation in the one-time-code ledger and mails the
//! code to the operator address. `verify` consumes the code and replays the
//! recorded mutation in the same transaction, so a code is spent exactly when
//! its mutation lands.

use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::ApprovalConfig;
use crate::db::{NewPendingAction, PendingActionRepository, Store, UserRepository};
use crate::domain::{OtpId, UserId};
use crate::models::{ActionType, PendingHandle, PrivilegedAction, User};
use crate::services::mailer::{self, Mailer};
use crate::services::password::{PasswordDigest, PasswordHasher};
use crate::services::user_service::UserError;

/// What a verified action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Created(User),
    Updated(User),
    PasswordChanged(UserId),
}

pub struct PrivilegedActions {
    store: Store,
    hasher: Arc<PasswordHasher>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    approver_email: String,
    code_ttl: Duration,
    brand: String,
}

#[must_use]
pub fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

impl PrivilegedActions {
    #[must_use]
    pub fn new(
        store: Store,
        hasher: Arc<PasswordHasher>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        approval: &ApprovalConfig,
        brand: impl Into<String>,
    ) -> Self {
        Self {
            store,
            hasher,
            mailer,
            clock,
            approver_email: approval.approver_email.clone(),
            code_ttl: Duration::minutes(approval.code_ttl_minutes),
            brand: brand.into(),
        }
    }

    /// Records `action` behind a fresh code and returns its handle. The code
    /// is mailed in the background; a failed delivery leaves the entry valid.
    pub async fn defer(
        &self,
        action: PrivilegedAction,
        requested_by: Option<UserId>,
    ) -> Result<PendingHandle, UserError> {
        let now = self.clock.now();
        let code = generate_code();
        let expires_at = now + self.code_ttl;

        let entry = self
            .store
            .pending_actions()
            .create(
                NewPendingAction {
                    recipient: &self.approver_email,
                    code: &code,
                    action: &action,
                    requested_by,
                    expires_at,
                },
                now,
            )
            .await?;

        metrics::counter!("otp_issued_total", "action" => entry.action.action_type().as_str())
            .increment(1);
        info!(
            otp_id = %entry.id,
            action = %entry.action.action_type(),
            target = ?entry.action.target(),
            requested_by = ?requested_by,
            "Privileged action deferred pending verification"
        );

        let mail = mailer::otp_email(
            &self.approver_email,
            &code,
            self.code_ttl.num_minutes(),
            &self.brand,
        );
        let sender = Arc::clone(&self.mailer);
        let otp_id = entry.id;
        tokio::spawn(async move {
            if let Err(e) = sender.send(mail).await {
                warn!(otp_id = %otp_id, error = %e, "Failed to deliver verification code");
            }
        });

        Ok(PendingHandle {
            otp_id: entry.id,
            action_type: entry.action.action_type(),
            expires_at,
        })
    }

    /// Consumes `(otp_id, code)` for an entry of type `kind` and applies its
    /// payload. Fails with [`UserError::InvalidOrExpiredCode`] for unknown,
    /// mismatched, consumed or expired entries, before any password is
    /// hashed. If applying fails the whole transaction rolls back and the
    /// code stays usable.
    pub async fn verify(
        &self,
        kind: ActionType,
        otp_id: OtpId,
        code: &str,
    ) -> Result<Applied, UserError> {
        let now = self.clock.now();

        let entry = self
            .store
            .pending_actions()
            .find_matching(otp_id, code, kind)
            .await?
            .filter(|entry| entry.is_open(now));
        let Some(entry) = entry else {
            return Err(self.reject(otp_id, kind));
        };

        let digest = match &entry.action {
            PrivilegedAction::CreateAdmin { user } => Some(self.hasher.hash(&user.password).await?),
            PrivilegedAction::UpdateAdminPassword { new_password, .. } => {
                Some(self.hasher.hash(new_password).await?)
            }
            PrivilegedAction::UpdateAdmin { .. } => None,
        };

        let txn = self.store.begin().await?;
        if !PendingActionRepository::new(&txn)
            .consume(otp_id, code, kind, now)
            .await?
        {
            return Err(self.reject(otp_id, kind));
        }

        let applied = apply(&UserRepository::new(&txn), entry.action, digest, now).await?;
        txn.commit().await?;

        metrics::counter!("otp_verified_total", "action" => kind.as_str()).increment(1);
        info!(otp_id = %otp_id, action = %kind, "Privileged action verified and applied");
        Ok(applied)
    }

    fn reject(&self, otp_id: OtpId, kind: ActionType) -> UserError {
        warn!(otp_id = %otp_id, action = %kind, approver = %self.approver_email, "Verification code rejected");
        UserError::InvalidOrExpiredCode
    }
}

async fn apply<C: sea_orm::ConnectionTrait>(
    users: &UserRepository<'_, C>,
    action: PrivilegedAction,
    digest: Option<PasswordDigest>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Applied, UserError> {
    let digest = || digest.ok_or_else(|| UserError::Internal("password digest missing".into()));

    match action {
        PrivilegedAction::CreateAdmin { user } => {
            if users.username_exists(&user.username, None).await? {
                return Err(UserError::DuplicateUsername);
            }
            if users.email_exists(&user.email, None).await? {
                return Err(UserError::DuplicateEmail);
            }
            let created = users.create(&user, digest()?, now).await?;
            Ok(Applied::Created(created))
        }
        PrivilegedAction::UpdateAdmin { target_id, changes } => {
            if users.find_by_id(target_id).await?.is_none() {
                return Err(UserError::UserNotFound);
            }
            if let Some(username) = &changes.username
                && users.username_exists(username, Some(target_id)).await?
            {
                return Err(UserError::DuplicateUsername);
            }
            if let Some(email) = &changes.email
                && users.email_exists(email, Some(target_id)).await?
            {
                return Err(UserError::DuplicateEmail);
            }
            let updated = users
                .update(target_id, &changes, now)
                .await?
                .ok_or(UserError::UserNotFound)?;
            Ok(Applied::Updated(updated))
        }
        PrivilegedAction::UpdateAdminPassword { target_id, .. } => {
            if !users.set_password(target_id, digest()?, now).await? {
                return Err(UserError::UserNotFound);
            }
            Ok(Applied::PasswordChanged(target_id))
        }
    }
}
