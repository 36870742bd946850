use regex::Regex;
use std::sync::LazyLock;

use super::ApiError;
use super::types::{CreateUserRequest, LoginRequest, UpdateUserRequest, VerifyCodeRequest};
use crate::domain::{OtpId, UserId};
use crate::models::{NewUser, Role, UserChanges};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid username regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

pub fn validate_user_id(id: i32) -> Result<UserId, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid user ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(UserId::new(id))
}

pub fn validate_username(username: &str) -> Result<String, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if !(3..=50).contains(&username.chars().count()) {
        return Err(ApiError::validation(
            "Username must be between 3 and 50 characters",
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, and underscores",
        ));
    }
    Ok(username.to_string())
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    let len = password.chars().count();
    if len < 8 {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
        ));
    }
    if len > 128 {
        return Err(ApiError::validation(
            "Password must be less than 128 characters",
        ));
    }
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Err(ApiError::validation(
            "Password must contain at least one lowercase letter, one uppercase letter, and one number",
        ));
    }
    Ok(password)
}

/// Returns the address trimmed and lowercased.
pub fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim();
    if email.len() > 254 || !EMAIL_RE.is_match(email) {
        return Err(ApiError::validation("Valid email is required"));
    }
    Ok(email.to_lowercase())
}

pub fn validate_name(name: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    let Some(name) = name else {
        return Ok(None);
    };
    let name = name.trim();
    if !(2..=50).contains(&name.chars().count()) {
        return Err(ApiError::validation(format!(
            "{field} must be between 2 and 50 characters"
        )));
    }
    Ok(Some(name.to_string()))
}

/// Like [`validate_name`], but the field must be present.
pub fn require_name(name: Option<String>, field: &str) -> Result<String, ApiError> {
    validate_name(name, field)?
        .ok_or_else(|| ApiError::validation(format!("{field} is required")))
}

pub fn validate_role(role: &str) -> Result<Role, ApiError> {
    role.parse()
        .map_err(|_| ApiError::validation("Role must be either admin or user"))
}

pub fn validate_login(request: &LoginRequest) -> Result<(), ApiError> {
    if request.username.trim().is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if request.password.chars().count() < 6 {
        return Err(ApiError::validation(
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

pub fn validate_code(request: &VerifyCodeRequest) -> Result<(OtpId, &str), ApiError> {
    let otp_id = request
        .otp_id
        .and_then(|id| i32::try_from(id).ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::validation("otpId is required"))?;

    let code = request.code.trim();
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::validation("Code must be 6 digits"));
    }
    Ok((OtpId::new(otp_id), code))
}

pub fn validate_new_user(request: CreateUserRequest) -> Result<NewUser, ApiError> {
    let username = validate_username(&request.username)?;
    validate_password(&request.password)?;
    let role = request
        .role
        .as_deref()
        .map(validate_role)
        .transpose()?
        .unwrap_or_default();
    let email = validate_email(&request.email)?;

    Ok(NewUser {
        username,
        password: request.password,
        role,
        email,
        first_name: Some(require_name(request.first_name, "First name")?),
        last_name: Some(require_name(request.last_name, "Last name")?),
    })
}

/// Validates each provided field. May return an empty change set; the
/// service decides what that means.
pub fn validate_changes(request: UpdateUserRequest) -> Result<UserChanges, ApiError> {
    Ok(UserChanges {
        username: request
            .username
            .as_deref()
            .map(validate_username)
            .transpose()?,
        email: request.email.as_deref().map(validate_email).transpose()?,
        first_name: validate_name(request.first_name, "First name")?,
        last_name: validate_name(request.last_name, "Last name")?,
        role: request.role.as_deref().map(validate_role).transpose()?,
        is_active: request.is_active,
    })
}
