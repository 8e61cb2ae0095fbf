use sqlx::FromRow;

/// RBAC role. Names are unique and stable; the catalog is seeded at startup.
#[derive(Debug, Clone, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Permission registry entry; `code` is the stable identifier routes ask for.
#[derive(Debug, Clone, FromRow)]
pub struct Permission {
    pub id: i64,
    pub code: String,
    pub description: Option<String>,
}
