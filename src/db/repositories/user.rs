use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use thiserror::Error;

use crate::domain::UserId;
use crate::entities::users;
use crate::models::{NewUser, Role, StoredCredentials, User, UserChanges};
use crate::services::password::PasswordDigest;

/// An update whose change set carried nothing the store accepts.
#[derive(Debug, Error)]
#[error("No fields to update")]
pub struct NoFieldsToUpdate;

/// Access to the `users` table. Works against the pool or an open
/// transaction.
pub struct UserRepository<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> UserRepository<'a, C> {
    #[must_use]
    pub const fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Active user by exact username, with the fields login needs.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<StoredCredentials>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .filter(users::Column::IsActive.eq(true))
            .one(self.conn)
            .await
            .context("Failed to query user by username")?;

        user.map(StoredCredentials::try_from).transpose()
    }

    pub async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.find_credentials_by_id(id).await?.map(|c| c.user))
    }

    pub async fn find_credentials_by_id(&self, id: UserId) -> Result<Option<StoredCredentials>> {
        let user = users::Entity::find_by_id(id.value())
            .filter(users::Column::IsActive.eq(true))
            .one(self.conn)
            .await
            .context("Failed to query user by ID")?;

        user.map(StoredCredentials::try_from).transpose()
    }

    /// Exact match over every row, soft-deleted ones included.
    pub async fn username_exists(&self, username: &str, exclude: Option<UserId>) -> Result<bool> {
        let mut query = users::Entity::find().filter(users::Column::Username.eq(username));
        if let Some(id) = exclude {
            query = query.filter(users::Column::Id.ne(id.value()));
        }

        let count = query
            .count(self.conn)
            .await
            .context("Failed to check username")?;
        Ok(count > 0)
    }

    /// Case-insensitive match over every row, soft-deleted ones included.
    pub async fn email_exists(&self, email: &str, exclude: Option<UserId>) -> Result<bool> {
        let mut query = users::Entity::find().filter(
            Expr::expr(Func::lower(Expr::col(users::Column::Email))).eq(email.to_lowercase()),
        );
        if let Some(id) = exclude {
            query = query.filter(users::Column::Id.ne(id.value()));
        }

        let count = query.count(self.conn).await.context("Failed to check email")?;
        Ok(count > 0)
    }

    pub async fn create(
        &self,
        user: &NewUser,
        password: PasswordDigest,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let active = users::ActiveModel {
            username: Set(user.username.clone()),
            password_hash: Set(password.into_string()),
            role: Set(user.role.as_str().to_string()),
            email: Set(user.email.to_lowercase()),
            first_name: Set(user.first_name.clone()),
            last_name: Set(user.last_name.clone()),
            is_active: Set(true),
            login_attempts: Set(0),
            locked_until: Set(None),
            last_login: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(self.conn)
            .await
            .with_context(|| format!("Failed to create user {}", user.username))?;
        User::try_from(model)
    }

    /// Merges the provided fields into an active user. Returns `None` when no
    /// active user has that id.
    pub async fn update(
        &self,
        id: UserId,
        changes: &UserChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        if changes.is_empty() {
            return Err(NoFieldsToUpdate.into());
        }

        let mut update = users::Entity::update_many()
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::IsActive.eq(true));

        if let Some(username) = &changes.username {
            update = update.col_expr(users::Column::Username, Expr::value(username.clone()));
        }
        if let Some(email) = &changes.email {
            update = update.col_expr(users::Column::Email, Expr::value(email.to_lowercase()));
        }
        if let Some(first_name) = &changes.first_name {
            update = update.col_expr(users::Column::FirstName, Expr::value(first_name.clone()));
        }
        if let Some(last_name) = &changes.last_name {
            update = update.col_expr(users::Column::LastName, Expr::value(last_name.clone()));
        }
        if let Some(role) = changes.role {
            update = update.col_expr(users::Column::Role, Expr::value(role.as_str()));
        }
        if let Some(is_active) = changes.is_active {
            update = update.col_expr(users::Column::IsActive, Expr::value(is_active));
        }

        let result = update
            .exec(self.conn)
            .await
            .with_context(|| format!("Failed to update user {id}"))?;
        if result.rows_affected == 0 {
            return Ok(None);
        }

        let model = users::Entity::find_by_id(id.value())
            .one(self.conn)
            .await
            .context("Failed to reload updated user")?;
        model.map(User::try_from).transpose()
    }

    /// Flips `is_active` off. The row stays, so its username and email
    /// remain taken.
    pub async fn soft_delete(&self, id: UserId, now: DateTime<Utc>) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::IsActive, Expr::value(false))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::IsActive.eq(true))
            .exec(self.conn)
            .await
            .with_context(|| format!("Failed to delete user {id}"))?;

        Ok(result.rows_affected > 0)
    }

    pub async fn set_password(
        &self,
        id: UserId,
        password: PasswordDigest,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password.into_string()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::IsActive.eq(true))
            .exec(self.conn)
            .await
            .with_context(|| format!("Failed to update password for user {id}"))?;

        Ok(result.rows_affected > 0)
    }

    /// Atomically bumps the failed-attempt counter and returns the new value.
    pub async fn increment_login_attempts(&self, id: UserId) -> Result<u32> {
        users::Entity::update_many()
            .col_expr(
                users::Column::LoginAttempts,
                Expr::col(users::Column::LoginAttempts).add(1),
            )
            .filter(users::Column::Id.eq(id.value()))
            .exec(self.conn)
            .await
            .with_context(|| format!("Failed to record failed login for user {id}"))?;

        let model = users::Entity::find_by_id(id.value())
            .one(self.conn)
            .await
            .context("Failed to reload login attempts")?
            .ok_or_else(|| anyhow::anyhow!("User {id} vanished during login"))?;

        Ok(u32::try_from(model.login_attempts).unwrap_or(0))
    }

    pub async fn lock_until(&self, id: UserId, until: DateTime<Utc>) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::LockedUntil, Expr::value(Some(until)))
            .filter(users::Column::Id.eq(id.value()))
            .exec(self.conn)
            .await
            .with_context(|| format!("Failed to lock user {id}"))?;
        Ok(())
    }

    /// Clears the counter and any lock, and stamps `last_login`.
    pub async fn record_login_success(&self, id: UserId, now: DateTime<Utc>) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::LoginAttempts, Expr::value(0))
            .col_expr(
                users::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(users::Column::LastLogin, Expr::value(Some(now)))
            .filter(users::Column::Id.eq(id.value()))
            .exec(self.conn)
            .await
            .with_context(|| format!("Failed to record login for user {id}"))?;
        Ok(())
    }

    pub async fn count_active_admins(&self) -> Result<u64> {
        users::Entity::find()
            .filter(users::Column::Role.eq(Role::Admin.as_str()))
            .filter(users::Column::IsActive.eq(true))
            .count(self.conn)
            .await
            .context("Failed to count admins")
    }

    /// Active users, newest first.
    pub async fn list_active(&self) -> Result<Vec<User>> {
        let rows = users::Entity::find()
            .filter(users::Column::IsActive.eq(true))
            .order_by_desc(users::Column::CreatedAt)
            .order_by_desc(users::Column::Id)
            .all(self.conn)
            .await
            .context("Failed to list users")?;

        rows.into_iter().map(User::try_from).collect()
    }
}
