//! Role/permission catalog synchronization.
//!
//! The catalog is code-defined and pushed into the database idempotently at
//! startup; rerunning against an already-seeded database changes nothing.

use sqlx::PgPool;

pub const ROLES: &[(&str, &str)] = &[
    ("owner", "Workspace/Project owner"),
    ("admin", "Workspace/Project admin"),
    ("editor", "Can create/update resources"),
    ("viewer", "Read-only access"),
];

pub const PERMISSIONS: &[(&str, &str)] = &[
    ("workspace.manage", "Manage workspace settings/members"),
    ("project.manage", "Manage projects"),
    ("doc.read", "Read documents"),
    ("doc.write", "Create/update documents"),
    ("doc.delete", "Delete documents"),
    ("ticket.read", "Read tickets"),
    ("ticket.create", "Create tickets"),
    ("ticket.approve", "Approve tickets"),
    ("ticket.close", "Close tickets"),
];

const EDITOR_PERMS: &[&str] = &["doc.read", "doc.write", "ticket.read", "ticket.create"];
const VIEWER_PERMS: &[&str] = &["doc.read", "ticket.read"];

fn role_permissions(role: &str) -> Vec<&'static str> {
    match role {
        // Owner and admin hold the full catalog.
        "owner" | "admin" => PERMISSIONS.iter().map(|(code, _)| *code).collect(),
        "editor" => EDITOR_PERMS.to_vec(),
        "viewer" => VIEWER_PERMS.to_vec(),
        _ => Vec::new(),
    }
}

/// Upsert the catalog: roles, permissions, and the role→permission junction.
pub async fn sync_catalog(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for (name, description) in ROLES {
        sqlx::query(
            r#"
            INSERT INTO roles (name, description)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(description)
        .execute(&mut *tx)
        .await?;
    }

    for (code, description) in PERMISSIONS {
        sqlx::query(
            r#"
            INSERT INTO permissions (code, description)
            VALUES ($1, $2)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(code)
        .bind(description)
        .execute(&mut *tx)
        .await?;
    }

    for (role, _) in ROLES {
        for code in role_permissions(role) {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, perm_id)
                SELECT r.id, p.id FROM roles r, permissions p
                WHERE r.name = $1 AND p.code = $2
                ON CONFLICT (role_id, perm_id) DO NOTHING
                "#,
            )
            .bind(role)
            .bind(code)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    tracing::info!(
        roles = ROLES.len(),
        permissions = PERMISSIONS.len(),
        "authorization catalog synchronized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions_are_known_codes() {
        let codes: Vec<&str> = PERMISSIONS.iter().map(|(code, _)| *code).collect();
        for (role, _) in ROLES {
            for code in role_permissions(role) {
                assert!(codes.contains(&code), "{role} maps unknown code {code}");
            }
        }
    }

    #[test]
    fn test_owner_holds_everything() {
        assert_eq!(role_permissions("owner").len(), PERMISSIONS.len());
    }

    #[test]
    fn test_unknown_role_is_empty() {
        assert!(role_permissions("nobody").is_empty());
    }
}
