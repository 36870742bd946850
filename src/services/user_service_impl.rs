//! `SeaORM` implementation of the `UserService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::db::Store;
use crate::domain::{OtpId, UserId};
use crate::models::{ActionType, NewUser, PrivilegedAction, Role, User, UserChanges};
use crate::services::password::PasswordHasher;
use crate::services::privileged::{Applied, PrivilegedActions};
use crate::services::user_service::{Outcome, UserError, UserService};

pub struct SeaOrmUserService {
    store: Store,
    hasher: Arc<PasswordHasher>,
    privileged: Arc<PrivilegedActions>,
    clock: Arc<dyn Clock>,
}

impl SeaOrmUserService {
    #[must_use]
    pub fn new(
        store: Store,
        hasher: Arc<PasswordHasher>,
        privileged: Arc<PrivilegedActions>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            privileged,
            clock,
        }
    }

    async fn find_target(&self, id: UserId) -> Result<User, UserError> {
        self.store
            .users()
            .find_by_id(id)
            .await?
            .ok_or(UserError::UserNotFound)
    }

    async fn ensure_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        exclude: Option<UserId>,
    ) -> Result<(), UserError> {
        let users = self.store.users();
        if let Some(username) = username
            && users.username_exists(username, exclude).await?
        {
            return Err(UserError::DuplicateUsername);
        }
        if let Some(email) = email
            && users.email_exists(email, exclude).await?
        {
            return Err(UserError::DuplicateEmail);
        }
        Ok(())
    }

    /// Shared by the admin endpoint and profile edits.
    async fn apply_changes(
        &self,
        actor: UserId,
        target: &User,
        changes: UserChanges,
    ) -> Result<Outcome<User>, UserError> {
        if changes.is_empty() {
            return Err(UserError::NoChangesSubmitted);
        }
        self.ensure_unique(
            changes.username.as_deref(),
            changes.email.as_deref(),
            Some(target.id),
        )
        .await?;

        if target.is_protected() || changes.promotes_to_admin() {
            let handle = self
                .privileged
                .defer(
                    PrivilegedAction::UpdateAdmin {
                        target_id: target.id,
                        changes,
                    },
                    Some(actor),
                )
                .await?;
            return Ok(Outcome::Deferred(handle));
        }

        let updated = self
            .store
            .users()
            .update(target.id, &changes, self.clock.now())
            .await?
            .ok_or(UserError::UserNotFound)?;
        info!(user_id = %updated.id, by = %actor, "User updated");
        Ok(Outcome::Applied(updated))
    }

    async fn apply_password(
        &self,
        actor: UserId,
        target: &User,
        new_password: String,
    ) -> Result<Outcome<()>, UserError> {
        if target.is_protected() {
            let handle = self
                .privileged
                .defer(
                    PrivilegedAction::UpdateAdminPassword {
                        target_id: target.id,
                        new_password,
                    },
                    Some(actor),
                )
                .await?;
            return Ok(Outcome::Deferred(handle));
        }

        let digest = self.hasher.hash(&new_password).await?;
        if !self
            .store
            .users()
            .set_password(target.id, digest, self.clock.now())
            .await?
        {
            return Err(UserError::UserNotFound);
        }
        info!(user_id = %target.id, by = %actor, "Password updated");
        Ok(Outcome::Applied(()))
    }
}

fn unexpected(applied: &Applied) -> UserError {
    UserError::Internal(format!("verification applied an unexpected action: {applied:?}"))
}

#[async_trait]
impl UserService for SeaOrmUserService {
    async fn list(&self) -> Result<Vec<User>, UserError> {
        Ok(self.store.users().list_active().await?)
    }

    async fn get(&self, id: UserId) -> Result<User, UserError> {
        self.find_target(id).await
    }

    async fn create(&self, actor: UserId, user: NewUser) -> Result<Outcome<User>, UserError> {
        self.ensure_unique(Some(&user.username), Some(&user.email), None)
            .await?;

        if user.role == Role::Admin {
            let handle = self
                .privileged
                .defer(PrivilegedAction::CreateAdmin { user }, Some(actor))
                .await?;
            return Ok(Outcome::Deferred(handle));
        }

        let digest = self.hasher.hash(&user.password).await?;
        let created = self
            .store
            .users()
            .create(&user, digest, self.clock.now())
            .await?;
        info!(user_id = %created.id, username = %created.username, by = %actor, "User created");
        Ok(Outcome::Applied(created))
    }

    async fn update(
        &self,
        actor: UserId,
        id: UserId,
        changes: UserChanges,
    ) -> Result<Outcome<User>, UserError> {
        let target = self.find_target(id).await?;
        self.apply_changes(actor, &target, changes).await
    }

    async fn reset_password(
        &self,
        actor: UserId,
        id: UserId,
        new_password: String,
    ) -> Result<Outcome<()>, UserError> {
        let target = self.find_target(id).await?;
        self.apply_password(actor, &target, new_password).await
    }

    async fn delete(&self, actor: UserId, id: UserId) -> Result<(), UserError> {
        let target = self.find_target(id).await?;
        if target.id == actor {
            return Err(UserError::SelfDeletionForbidden);
        }

        if !self
            .store
            .users()
            .soft_delete(target.id, self.clock.now())
            .await?
        {
            return Err(UserError::UserNotFound);
        }
        info!(user_id = %target.id, username = %target.username, by = %actor, "User deactivated");
        Ok(())
    }

    async fn verify_create_admin(&self, otp_id: OtpId, code: &str) -> Result<User, UserError> {
        match self
            .privileged
            .verify(ActionType::CreateAdmin, otp_id, code)
            .await?
        {
            Applied::Created(user) => Ok(user),
            other => Err(unexpected(&other)),
        }
    }

    async fn verify_update_admin(&self, otp_id: OtpId, code: &str) -> Result<User, UserError> {
        match self
            .privileged
            .verify(ActionType::UpdateAdmin, otp_id, code)
            .await?
        {
            Applied::Updated(user) => Ok(user),
            other => Err(unexpected(&other)),
        }
    }

    async fn verify_update_admin_password(
        &self,
        otp_id: OtpId,
        code: &str,
    ) -> Result<(), UserError> {
        match self
            .privileged
            .verify(ActionType::UpdateAdminPassword, otp_id, code)
            .await?
        {
            Applied::PasswordChanged(_) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn profile(&self, actor: UserId) -> Result<User, UserError> {
        self.find_target(actor).await
    }

    async fn update_profile(
        &self,
        actor: UserId,
        changes: UserChanges,
    ) -> Result<Outcome<User>, UserError> {
        let target = self.find_target(actor).await?;
        self.apply_changes(actor, &target, changes.profile_only())
            .await
    }

    async fn change_own_password(
        &self,
        actor: UserId,
        current_password: &str,
        new_password: String,
    ) -> Result<Outcome<()>, UserError> {
        let credentials = self
            .store
            .users()
            .find_credentials_by_id(actor)
            .await?
            .ok_or(UserError::UserNotFound)?;

        if !self
            .hasher
            .verify(current_password, &credentials.password_hash)
            .await?
        {
            return Err(UserError::CurrentPasswordIncorrect);
        }

        self.apply_password(actor, &credentials.user, new_password)
            .await
    }
}
