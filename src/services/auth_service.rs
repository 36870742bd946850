//! Domain service for authentication.
//!
//! Handles login with brute-force lockout and session token verification.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::UserId;
use crate::models::{Role, User};
use crate::services::token::{Claims, TokenError};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username and wrong password look the same from outside.
    /// `remaining_attempts` is only known for an existing account.
    #[error("Invalid credentials")]
    InvalidCredentials { remaining_attempts: Option<u32> },

    #[error("Account is locked until {locked_until}")]
    AccountLocked { locked_until: DateTime<Utc> },

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::InvalidToken,
            TokenError::Expired => Self::ExpiredToken,
            TokenError::Signing => Self::Internal(err.to_string()),
        }
    }
}

/// Identity carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

impl SessionUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl TryFrom<Claims> for SessionUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            id: claims.user_id()?,
            username: claims.username,
            role: claims.role,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Checks credentials and issues a session token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AccountLocked`] before the password is looked at
    /// when the account is locked, and [`AuthError::InvalidCredentials`] for
    /// any other failure.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError>;

    /// Validates a bearer token without touching the store.
    fn verify_token(&self, token: &str) -> Result<SessionUser, AuthError>;
}
