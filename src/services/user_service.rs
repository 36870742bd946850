//! Domain service for user administration and the approval workflow that
//! guards admin accounts.

use sea_orm::SqlErr;
use thiserror::Error;

use crate::db::NoFieldsToUpdate;
use crate::domain::{OtpId, UserId};
use crate::models::{NewUser, PendingHandle, User, UserChanges};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Email already exists")]
    DuplicateEmail,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid or expired code")]
    InvalidOrExpiredCode,

    #[error("No changes submitted")]
    NoChangesSubmitted,

    #[error("You cannot delete your own account")]
    SelfDeletionForbidden,

    #[error("Current password is incorrect")]
    CurrentPasswordIncorrect,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for UserError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message)) => unique_violation(&message),
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for UserError {
    fn from(err: anyhow::Error) -> Self {
        if err.downcast_ref::<NoFieldsToUpdate>().is_some() {
            return Self::NoChangesSubmitted;
        }
        if let Some(db) = err.downcast_ref::<sea_orm::DbErr>()
            && let Some(SqlErr::UniqueConstraintViolation(message)) = db.sql_err()
        {
            return unique_violation(&message);
        }
        Self::Internal(format!("{err:#}"))
    }
}

/// A uniqueness race lost at the database. SQLite names the column in the
/// message (`UNIQUE constraint failed: users.email`).
fn unique_violation(message: &str) -> UserError {
    if message.contains("email") {
        UserError::DuplicateEmail
    } else {
        UserError::DuplicateUsername
    }
}

/// Result of a mutation that may have been held for approval.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Applied(T),
    Deferred(PendingHandle),
}

impl<T> Outcome<T> {
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Applied(value) => Outcome::Applied(f(value)),
            Self::Deferred(handle) => Outcome::Deferred(handle),
        }
    }
}

/// Every operation takes the authenticated caller as `actor`.
#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    /// Active users, newest first.
    async fn list(&self) -> Result<Vec<User>, UserError>;

    async fn get(&self, id: UserId) -> Result<User, UserError>;

    /// Creates a user. An admin is never created directly: the request is
    /// deferred and the row only appears after [`Self::verify_create_admin`].
    async fn create(&self, actor: UserId, user: NewUser) -> Result<Outcome<User>, UserError>;

    /// Partial update. Deferred when the target is a protected admin or the
    /// change promotes the target to admin.
    async fn update(
        &self,
        actor: UserId,
        id: UserId,
        changes: UserChanges,
    ) -> Result<Outcome<User>, UserError>;

    async fn reset_password(
        &self,
        actor: UserId,
        id: UserId,
        new_password: String,
    ) -> Result<Outcome<()>, UserError>;

    /// Soft delete. Never deferred.
    async fn delete(&self, actor: UserId, id: UserId) -> Result<(), UserError>;

    async fn verify_create_admin(&self, otp_id: OtpId, code: &str) -> Result<User, UserError>;

    async fn verify_update_admin(&self, otp_id: OtpId, code: &str) -> Result<User, UserError>;

    async fn verify_update_admin_password(
        &self,
        otp_id: OtpId,
        code: &str,
    ) -> Result<(), UserError>;

    async fn profile(&self, actor: UserId) -> Result<User, UserError>;

    /// Self-service edit limited to email and names.
    async fn update_profile(
        &self,
        actor: UserId,
        changes: UserChanges,
    ) -> Result<Outcome<User>, UserError>;

    /// Requires the current password before anything else happens.
    async fn change_own_password(
        &self,
        actor: UserId,
        current_password: &str,
        new_password: String,
    ) -> Result<Outcome<()>, UserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_names_the_column() {
        assert!(matches!(
            unique_violation("UNIQUE constraint failed: users.email"),
            UserError::DuplicateEmail
        ));
        assert!(matches!(
            unique_violation("UNIQUE constraint failed: users.username"),
            UserError::DuplicateUsername
        ));
    }

    #[test]
    fn no_fields_maps_to_no_changes() {
        let err = anyhow::Error::new(NoFieldsToUpdate).context("updating user 3");
        assert!(matches!(UserError::from(err), UserError::NoChangesSubmitted));
    }
}
