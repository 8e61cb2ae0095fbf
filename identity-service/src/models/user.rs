use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// User row. This core only creates rows on registration and reads them
/// everywhere else; deactivation is an external concern.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    /// Bypasses every authorization check.
    pub is_superadmin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User shape safe to return to clients (no hash).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub id: i64,
    pub email: String,
    pub is_active: bool,
    pub is_superadmin: bool,
}

impl From<&User> for SanitizedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            is_active: user.is_active,
            is_superadmin: user.is_superadmin,
        }
    }
}
