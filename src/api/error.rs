use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::fmt;

use super::ApiResponse;
use crate::services::{AuthError, UserError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ValidationError(String),

    Conflict(String),

    InternalError(String),

    Unauthorized(String),

    Forbidden(String),

    InvalidCredentials { remaining_attempts: Option<u32> },

    Locked { locked_until: DateTime<Utc> },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::InvalidCredentials { .. } => f.write_str("Invalid credentials"),
            Self::Locked { locked_until } => write!(f, "Account locked until {locked_until}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                    None,
                )
            }
            Self::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            Self::InvalidCredentials { remaining_attempts } => (
                StatusCode::UNAUTHORIZED,
                "Invalid credentials".to_string(),
                remaining_attempts.map(|n| json!({ "remainingAttempts": n })),
            ),
            Self::Locked { locked_until } => (
                StatusCode::LOCKED,
                "Account is temporarily locked due to too many failed login attempts"
                    .to_string(),
                Some(json!({ "lockedUntil": locked_until })),
            ),
        };

        let mut body = ApiResponse::<()>::error(error_message);
        body.details = details;
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials { remaining_attempts } => {
                Self::InvalidCredentials { remaining_attempts }
            }
            AuthError::AccountLocked { locked_until } => Self::Locked { locked_until },
            AuthError::InvalidToken => Self::Unauthorized("Invalid token".to_string()),
            AuthError::ExpiredToken => Self::Unauthorized("Token expired".to_string()),
            AuthError::Validation(msg) => Self::ValidationError(msg),
            AuthError::Database(msg) => Self::DatabaseError(msg),
            AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Validation(msg) => Self::ValidationError(msg),
            UserError::DuplicateUsername | UserError::DuplicateEmail => {
                Self::Conflict(err.to_string())
            }
            UserError::UserNotFound => Self::NotFound(err.to_string()),
            UserError::InvalidOrExpiredCode
            | UserError::NoChangesSubmitted
            | UserError::SelfDeletionForbidden => Self::ValidationError(err.to_string()),
            UserError::CurrentPasswordIncorrect => Self::Unauthorized(err.to_string()),
            UserError::Database(msg) => Self::DatabaseError(msg),
            UserError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
