//! Authentication endpoints.
//!
//! Handlers stay thin: payload validation at the edge, then a single service
//! call. Audit recording happens inside the services so the events carry the
//! decision context.

use axum::{extract::State, http::StatusCode, Json};

use crate::dtos::{LoginRequest, LogoutRequest, MessageResponse, RefreshRequest, RegisterRequest};
use crate::middleware::AuthUser;
use crate::models::SanitizedUser;
use crate::services::{AuditTrail, ServiceError, TokenResponse};
use crate::utils::ValidatedJson;
use crate::AppState;

/// Register a new user.
///
/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    trail: AuditTrail,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<SanitizedUser>), ServiceError> {
    let user = state.auth.register(&req.email, &req.password, &trail).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with email and password.
///
/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    trail: AuditTrail,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    let tokens = state.auth.login(&req.email, &req.password, &trail).await?;
    Ok(Json(tokens))
}

/// Exchange a refresh token for a new token pair.
///
/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    trail: AuditTrail,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<TokenResponse>, ServiceError> {
    let tokens = state.auth.refresh(&req.refresh_token, &trail).await?;
    Ok(Json(tokens))
}

/// Logout: revoke the presented refresh token and invalidate every
/// outstanding access token for the caller.
///
/// POST /auth/logout (authenticated)
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    trail: AuditTrail,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.auth.logout(&req.refresh_token, &user, &trail).await?;
    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// Current authenticated user.
///
/// GET /auth/me
pub async fn me(AuthUser(user): AuthUser) -> Json<SanitizedUser> {
    Json(SanitizedUser::from(&user))
}
