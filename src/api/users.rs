use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::types::{
    ChangePasswordRequest, CreateUserRequest, MessageResponse, PendingResponse,
    ResetPasswordRequest, UpdateUserRequest, UserResponse, VerifyCodeRequest,
};
use super::validation::{
    validate_changes, validate_code, validate_new_user, validate_password, validate_user_id,
};
use super::{ApiError, ApiResponse, AppState};
use crate::models::User;
use crate::services::{Outcome, SessionUser};

/// 202 with the pending handle, or `applied` with the given status.
fn respond<T, B: serde::Serialize>(
    outcome: Outcome<T>,
    status: StatusCode,
    applied: impl FnOnce(T) -> B,
) -> Response {
    match outcome {
        Outcome::Applied(value) => {
            (status, Json(ApiResponse::success(applied(value)))).into_response()
        }
        Outcome::Deferred(handle) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(PendingResponse::from(handle))),
        )
            .into_response(),
    }
}

fn user_response(message: &'static str) -> impl FnOnce(User) -> UserResponse {
    move |user| UserResponse {
        message: message.to_string(),
        user,
    }
}

/// GET /users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    let users = state.shared.user_service.list().await?;
    Ok(Json(ApiResponse::success(users)))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let id = validate_user_id(id)?;
    let user = state.shared.user_service.get(id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionUser>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Response, ApiError> {
    let user = validate_new_user(payload)?;
    let outcome = state.shared.user_service.create(caller.id, user).await?;
    Ok(respond(
        outcome,
        StatusCode::CREATED,
        user_response("User created successfully"),
    ))
}

/// PUT /users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Response, ApiError> {
    let id = validate_user_id(id)?;
    let changes = validate_changes(payload)?;
    let outcome = state
        .shared
        .user_service
        .update(caller.id, id, changes)
        .await?;
    Ok(respond(
        outcome,
        StatusCode::OK,
        user_response("User updated successfully"),
    ))
}

/// PUT /users/{id}/password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionUser>,
    Path(id): Path<i32>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    let id = validate_user_id(id)?;
    validate_password(&payload.new_password)?;
    let outcome = state
        .shared
        .user_service
        .reset_password(caller.id, id, payload.new_password)
        .await?;
    Ok(respond(outcome, StatusCode::OK, |()| {
        MessageResponse::new("Password updated successfully")
    }))
}

/// DELETE /users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let id = validate_user_id(id)?;
    state.shared.user_service.delete(caller.id, id).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User deleted successfully",
    ))))
}

/// POST /users/verify/create-admin
pub async fn verify_create_admin(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let (otp_id, code) = validate_code(&payload)?;
    let user = state
        .shared
        .user_service
        .verify_create_admin(otp_id, code)
        .await?;
    Ok(Json(ApiResponse::success(UserResponse {
        message: "Admin created successfully".to_string(),
        user,
    })))
}

/// POST /users/verify/update-admin
pub async fn verify_update_admin(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let (otp_id, code) = validate_code(&payload)?;
    let user = state
        .shared
        .user_service
        .verify_update_admin(otp_id, code)
        .await?;
    Ok(Json(ApiResponse::success(UserResponse {
        message: "Admin updated successfully".to_string(),
        user,
    })))
}

/// POST /users/verify/update-admin-password
pub async fn verify_update_admin_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let (otp_id, code) = validate_code(&payload)?;
    state
        .shared
        .user_service
        .verify_update_admin_password(otp_id, code)
        .await?;
    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Admin password updated successfully",
    ))))
}

/// GET /users/profile/me
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionUser>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.shared.user_service.profile(caller.id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// PUT /users/profile/me
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionUser>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Response, ApiError> {
    let changes = validate_changes(UpdateUserRequest {
        username: None,
        role: None,
        is_active: None,
        ..payload
    })?;
    let outcome = state
        .shared
        .user_service
        .update_profile(caller.id, changes)
        .await?;
    Ok(respond(
        outcome,
        StatusCode::OK,
        user_response("Profile updated successfully"),
    ))
}

/// PUT /users/profile/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    if payload.current_password.is_empty() {
        return Err(ApiError::validation("Current password is required"));
    }
    validate_password(&payload.new_password)?;
    let outcome = state
        .shared
        .user_service
        .change_own_password(caller.id, &payload.current_password, payload.new_password)
        .await?;
    Ok(respond(outcome, StatusCode::OK, |()| {
        MessageResponse::new("Password updated successfully")
    }))
}
