use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A role granted to a user at a scope. At most one row per
/// (user_id, role_id, scope_key); enforced by a unique constraint so
/// concurrent duplicate grants collapse to a single row.
#[derive(Debug, Clone, FromRow)]
pub struct UserRoleGrant {
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub scope_key: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Grant listing row, joined with the role name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GrantRow {
    pub user_id: i64,
    pub role_name: String,
    pub scope_key: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}
