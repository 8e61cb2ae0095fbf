//! Administrative grant management.
//!
//! Grant creation uses `ON CONFLICT DO NOTHING` against the
//! (user_id, role_id, scope_key) unique constraint, so concurrent identical
//! grants both succeed and the table ends with exactly one row. Revocation
//! of a missing grant is a successful no-op.

use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;

use crate::models::{GrantRow, Role, User};
use crate::services::audit::{AuditDraft, AuditTrail};
use crate::services::ServiceError;

#[derive(Debug, Clone, Serialize)]
pub struct GrantOutcome {
    pub granted: bool,
    /// True when the grant already existed (including losing a race to a
    /// concurrent identical grant).
    pub idempotent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevokeOutcome {
    pub ok: bool,
    pub deleted: u64,
    pub idempotent: bool,
}

#[derive(Clone)]
pub struct AdminService {
    pool: PgPool,
}

impl AdminService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn grant_role(
        &self,
        actor: &User,
        target_user_id: i64,
        role_name: &str,
        scope_key: &str,
        trail: &AuditTrail,
    ) -> Result<GrantOutcome, ServiceError> {
        let deny_meta = |reason: &str| {
            json!({
                "reason": reason,
                "role_name": role_name,
                "scope_key": scope_key,
                "target_user_id": target_user_id,
                "actor_user_id": actor.id,
            })
        };

        let Some(role) = self.find_role(role_name).await? else {
            trail.record(
                AuditDraft::new("admin.grant_role")
                    .deny(404)
                    .meta(deny_meta("role_not_found"))
                    .error_code("admin.role_not_found"),
            );
            return Err(ServiceError::RoleNotFound);
        };

        let target_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(target_user_id)
                .fetch_one(&self.pool)
                .await?;
        if !target_exists {
            trail.record(
                AuditDraft::new("admin.grant_role")
                    .deny(404)
                    .meta(deny_meta("user_not_found"))
                    .error_code("admin.user_not_found"),
            );
            return Err(ServiceError::UserNotFound);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO user_role_grants (user_id, role_id, scope_key, created_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, role_id, scope_key) DO NOTHING
            "#,
        )
        .bind(target_user_id)
        .bind(role.id)
        .bind(scope_key)
        .bind(actor.id)
        .execute(&self.pool)
        .await?;

        // Zero rows means somebody (possibly a racing caller) already holds
        // this exact grant; the end state is identical either way.
        let idempotent = result.rows_affected() == 0;

        trail.record(
            AuditDraft::new("admin.grant_role").meta(json!({
                "idempotent": idempotent,
                "role_name": role_name,
                "scope_key": scope_key,
                "target_user_id": target_user_id,
                "actor_user_id": actor.id,
            })),
        );

        Ok(GrantOutcome {
            granted: true,
            idempotent,
        })
    }

    pub async fn revoke_role(
        &self,
        actor: &User,
        target_user_id: i64,
        role_name: &str,
        scope_key: &str,
        trail: &AuditTrail,
    ) -> Result<RevokeOutcome, ServiceError> {
        let Some(role) = self.find_role(role_name).await? else {
            // Unknown role: nothing to revoke, report the no-op as success.
            trail.record(
                AuditDraft::new("admin.revoke_role").meta(json!({
                    "idempotent": true,
                    "role_name": role_name,
                    "scope_key": scope_key,
                    "target_user_id": target_user_id,
                    "actor_user_id": actor.id,
                })),
            );
            return Ok(RevokeOutcome {
                ok: true,
                deleted: 0,
                idempotent: true,
            });
        };

        let result = sqlx::query(
            r#"
            DELETE FROM user_role_grants
            WHERE user_id = $1 AND role_id = $2 AND scope_key = $3
            "#,
        )
        .bind(target_user_id)
        .bind(role.id)
        .bind(scope_key)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();

        trail.record(
            AuditDraft::new("admin.revoke_role").meta(json!({
                "deleted": deleted,
                "idempotent": deleted == 0,
                "role_name": role_name,
                "scope_key": scope_key,
                "target_user_id": target_user_id,
                "actor_user_id": actor.id,
            })),
        );

        Ok(RevokeOutcome {
            ok: true,
            deleted,
            idempotent: deleted == 0,
        })
    }

    pub async fn list_grants(
        &self,
        actor: &User,
        user_id: Option<i64>,
        scope_key: Option<&str>,
        trail: &AuditTrail,
    ) -> Result<Vec<GrantRow>, ServiceError> {
        let rows: Vec<GrantRow> = sqlx::query_as(
            r#"
            SELECT g.user_id, r.name AS role_name, g.scope_key, g.created_by, g.created_at
            FROM user_role_grants g
            JOIN roles r ON r.id = g.role_id
            WHERE ($1::BIGINT IS NULL OR g.user_id = $1)
              AND ($2::VARCHAR IS NULL OR g.scope_key = $2)
            ORDER BY g.created_at
            "#,
        )
        .bind(user_id)
        .bind(scope_key)
        .fetch_all(&self.pool)
        .await?;

        trail.record(
            AuditDraft::new("admin.list_grants").meta(json!({
                "user_id": user_id,
                "scope_key": scope_key,
                "count": rows.len(),
                "actor_user_id": actor.id,
            })),
        );

        Ok(rows)
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>, ServiceError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }
}
