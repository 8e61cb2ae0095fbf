//! Scope-hierarchical permission resolution.
//!
//! A grant made at `global` satisfies checks at any scope, so every lookup
//! runs against the set `{scope, global}`. Denials are audited before the
//! error is returned; that ordering is part of the contract, not incidental
//! logging.

use serde_json::json;
use sqlx::PgPool;

use crate::models::User;
use crate::services::audit::{AuditDraft, AuditTrail};
use crate::services::scope::ScopeKey;
use crate::services::ServiceError;

/// Check that `user` holds every permission in `perm_codes` at `scope_key`
/// (or globally). Superadmins pass unconditionally; an empty requirement
/// always passes.
pub async fn require_permissions(
    pool: &PgPool,
    trail: &AuditTrail,
    user: &User,
    scope_key: &ScopeKey,
    perm_codes: &[&str],
) -> Result<(), ServiceError> {
    if user.is_superadmin {
        return Ok(());
    }
    if perm_codes.is_empty() {
        return Ok(());
    }

    let scopes = scope_key.scopes_with_global();

    let role_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT role_id FROM user_role_grants
        WHERE user_id = $1 AND scope_key = ANY($2)
        "#,
    )
    .bind(user.id)
    .bind(&scopes)
    .fetch_all(pool)
    .await?;

    if role_ids.is_empty() {
        trail.record(
            AuditDraft::new("rbac.role_required")
                .deny(403)
                .scope(scope_key.to_string())
                .meta(json!({ "user_id": user.id }))
                .error_code("rbac.role_required"),
        );
        return Err(ServiceError::RoleRequired {
            scope_key: scope_key.to_string(),
        });
    }

    let requested: Vec<String> = perm_codes.iter().map(|c| c.to_string()).collect();
    let held: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT p.code FROM permissions p
        JOIN role_permissions rp ON rp.perm_id = p.id
        WHERE rp.role_id = ANY($1) AND p.code = ANY($2)
        "#,
    )
    .bind(&role_ids)
    .bind(&requested)
    .fetch_all(pool)
    .await?;

    // Preserve the caller's order in the missing list for diagnostics.
    let missing: Vec<String> = requested
        .iter()
        .filter(|code| !held.contains(code))
        .cloned()
        .collect();

    if !missing.is_empty() {
        trail.record(
            AuditDraft::new("rbac.permission_missing")
                .deny(403)
                .scope(scope_key.to_string())
                .meta(json!({ "user_id": user.id, "missing": missing }))
                .error_code("rbac.permission_missing"),
        );
        return Err(ServiceError::PermissionMissing {
            scope_key: scope_key.to_string(),
            missing,
        });
    }

    Ok(())
}
