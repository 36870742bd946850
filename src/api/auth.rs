use axum::{
    Extension, Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::types::{LoginRequest, LoginResponse, MessageResponse, VerifyTokenResponse};
use super::validation::validate_login;
use super::{ApiError, ApiResponse, AppState};
use crate::services::SessionUser;

// ============================================================================
// Middleware
// ============================================================================

/// Requires `Authorization: Bearer <token>` and makes the verified
/// [`SessionUser`] available to handlers as an extension.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers)
        .ok_or_else(|| ApiError::unauthorized("Access token required"))?;

    let user = state.shared.auth_service.verify_token(token)?;
    tracing::Span::current().record("user_id", user.id.value());

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Must run inside [`require_auth`].
pub async fn require_admin(
    Extension(user): Extension<SessionUser>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !user.is_admin() {
        tracing::info!(user_id = %user.id, path = %request.uri().path(), "Admin route refused");
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    validate_login(&payload)?;

    let result = state
        .shared
        .auth_service
        .login(payload.username.trim(), &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(LoginResponse {
        message: "Login successful".to_string(),
        token: result.token,
        expires_at: result.expires_at,
        user: result.user,
    })))
}

/// GET /auth/verify
pub async fn verify(
    Extension(user): Extension<SessionUser>,
) -> Json<ApiResponse<VerifyTokenResponse>> {
    Json(ApiResponse::success(VerifyTokenResponse { valid: true, user }))
}

/// POST /auth/logout
///
/// Tokens are self-contained, so logging out is the client discarding its
/// copy.
pub async fn logout() -> Json<ApiResponse<MessageResponse>> {
    Json(ApiResponse::success(MessageResponse::new("Logout successful")))
}
