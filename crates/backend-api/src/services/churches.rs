use sqlx::SqlitePool;

use super::{now, ServiceError};
use crate::permissions::{can_manage_church, ensure, TenantScope};
use crate::routes::models::Church;
use crate::util::clean_required;

pub async fn get_church(pool: &SqlitePool, scope: &TenantScope) -> Result<Church, ServiceError> {
    let row = sqlx::query_as::<_, (String, String, Option<String>, String, String)>(
        r#"
        SELECT c.public_id, c.name, u.public_id, c.created_at, c.updated_at
        FROM churches c
        LEFT JOIN users u ON u.id = c.owner_user_id
        WHERE c.id = ?
        "#,
    )
    .bind(scope.church_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("Church not found"))?;

    let (id, name, owner_id, created_at, updated_at) = row;
    Ok(Church {
        id,
        name,
        owner_id,
        access: scope.access,
        created_at,
        updated_at,
    })
}

pub async fn rename_church(
    pool: &SqlitePool,
    scope: &TenantScope,
    name: &str,
) -> Result<Church, ServiceError> {
    ensure(can_manage_church(scope), "Only admins can rename the church")?;
    let name = clean_required(name, "name")?;

    sqlx::query("UPDATE churches SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(now())
        .bind(scope.church_id)
        .execute(pool)
        .await?;

    get_church(pool, scope).await
}
