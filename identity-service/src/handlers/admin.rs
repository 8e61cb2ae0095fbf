//! Grant management endpoints.
//!
//! All three require `workspace.manage` at global scope (superadmins pass
//! implicitly). Scope keys arriving from the client are parsed and stored in
//! canonical form, so `workspace:7` in a grant always matches `workspace:7`
//! in a later check.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::dtos::{GrantRequest, ListGrantsParams, RevokeParams};
use crate::middleware::AuthUser;
use crate::models::GrantRow;
use crate::services::admin::{GrantOutcome, RevokeOutcome};
use crate::services::authz::require_permissions;
use crate::services::{AuditTrail, ScopeKey, ServiceError};
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /admin/grants
pub async fn grant_role(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    trail: AuditTrail,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<(StatusCode, Json<GrantOutcome>), ServiceError> {
    require_permissions(
        &state.pool,
        &trail,
        &actor,
        &ScopeKey::Global,
        &["workspace.manage"],
    )
    .await?;

    let scope: ScopeKey = req
        .scope_key
        .parse()
        .map_err(|_| ServiceError::ScopeKeyInvalid)?;

    let outcome = state
        .admin
        .grant_role(&actor, req.user_id, &req.role_name, &scope.to_string(), &trail)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// DELETE /admin/grants
pub async fn revoke_role(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    trail: AuditTrail,
    Query(params): Query<RevokeParams>,
) -> Result<Json<RevokeOutcome>, ServiceError> {
    require_permissions(
        &state.pool,
        &trail,
        &actor,
        &ScopeKey::Global,
        &["workspace.manage"],
    )
    .await?;

    let scope: ScopeKey = params
        .scope_key
        .parse()
        .map_err(|_| ServiceError::ScopeKeyInvalid)?;

    let outcome = state
        .admin
        .revoke_role(
            &actor,
            params.user_id,
            &params.role_name,
            &scope.to_string(),
            &trail,
        )
        .await?;
    Ok(Json(outcome))
}

/// GET /admin/grants
pub async fn list_grants(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    trail: AuditTrail,
    Query(params): Query<ListGrantsParams>,
) -> Result<Json<Vec<GrantRow>>, ServiceError> {
    require_permissions(
        &state.pool,
        &trail,
        &actor,
        &ScopeKey::Global,
        &["workspace.manage"],
    )
    .await?;

    // Normalize the scope filter so it matches stored canonical keys.
    let scope = params
        .scope_key
        .as_deref()
        .map(|raw| {
            raw.parse::<ScopeKey>()
                .map(|s| s.to_string())
                .map_err(|_| ServiceError::ScopeKeyInvalid)
        })
        .transpose()?;

    let rows = state
        .admin
        .list_grants(&actor, params.user_id, scope.as_deref(), &trail)
        .await?;
    Ok(Json(rows))
}
