use flock_auth::User;
use sqlx::SqlitePool;

use super::ServiceError;
use crate::permissions::{AccessLevel, TenantScope};
use crate::routes::models::AccessibleChurch;

/// Work out how `user` may reach the church identified by `church_public_id`.
///
/// The caller's own church yields a full scope with their role. A church
/// reachable through an active access link where the caller is the viewer
/// yields a read-only scope. Anything else is forbidden.
pub async fn resolve_scope(
    pool: &SqlitePool,
    user: &User,
    church_public_id: &str,
) -> Result<TenantScope, ServiceError> {
    let church_id: Option<i64> = sqlx::query_scalar("SELECT id FROM churches WHERE public_id = ?")
        .bind(church_public_id)
        .fetch_optional(pool)
        .await?;

    let church_id = church_id.ok_or_else(|| ServiceError::not_found("Church not found"))?;

    if user.church_id == Some(church_id) {
        return Ok(TenantScope {
            church_id,
            church_public_id: church_public_id.to_string(),
            access: AccessLevel::Full,
            role: user.role,
        });
    }

    let link: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM access_links
        WHERE viewer_user_id = ? AND church_id = ? AND revoked_at IS NULL
        "#,
    )
    .bind(user.id)
    .bind(church_id)
    .fetch_optional(pool)
    .await?;

    if link.is_some() {
        return Ok(TenantScope {
            church_id,
            church_public_id: church_public_id.to_string(),
            access: AccessLevel::ReadOnly,
            role: user.role,
        });
    }

    Err(ServiceError::forbidden("You do not have access to this church"))
}

/// Full scope over the caller's own church.
pub async fn own_scope(pool: &SqlitePool, user: &User) -> Result<TenantScope, ServiceError> {
    let church_id = user
        .church_id
        .ok_or_else(|| ServiceError::forbidden("You are not assigned to a church"))?;

    let church_public_id: Option<String> =
        sqlx::query_scalar("SELECT public_id FROM churches WHERE id = ?")
            .bind(church_id)
            .fetch_optional(pool)
            .await?;

    let church_public_id =
        church_public_id.ok_or_else(|| ServiceError::not_found("Church not found"))?;

    Ok(TenantScope {
        church_id,
        church_public_id,
        access: AccessLevel::Full,
        role: user.role,
    })
}

pub async fn list_accessible_churches(
    pool: &SqlitePool,
    user: &User,
) -> Result<Vec<AccessibleChurch>, ServiceError> {
    let rows: Vec<(String, String, bool)> = sqlx::query_as(
        r#"
        SELECT public_id, name, is_own FROM (
            SELECT c.public_id, c.name, 1 AS is_own
            FROM churches c
            WHERE c.id = ?
            UNION ALL
            SELECT c.public_id, c.name, 0 AS is_own
            FROM access_links l
            JOIN churches c ON c.id = l.church_id
            WHERE l.viewer_user_id = ? AND l.revoked_at IS NULL AND c.id IS NOT ?
        )
        ORDER BY is_own DESC, name COLLATE NOCASE
        "#,
    )
    .bind(user.church_id)
    .bind(user.id)
    .bind(user.church_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, is_own)| AccessibleChurch {
            id,
            name,
            access: if is_own {
                AccessLevel::Full
            } else {
                AccessLevel::ReadOnly
            },
            is_own,
        })
        .collect())
}
