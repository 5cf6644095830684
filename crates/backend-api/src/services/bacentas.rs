use flock_auth::new_public_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::{now, ServiceError};
use crate::permissions::{can_manage_bacentas, ensure, TenantScope};
use crate::routes::models::Bacenta;
use crate::util::clean_required;

const SELECT_BACENTA: &str = r#"
    SELECT b.public_id, b.name,
           (SELECT COUNT(*) FROM members m WHERE m.bacenta_id = b.id) AS member_count,
           b.created_at, b.updated_at
    FROM bacentas b
"#;

pub async fn list_bacentas(
    pool: &SqlitePool,
    scope: &TenantScope,
) -> Result<Vec<Bacenta>, ServiceError> {
    let bacentas = sqlx::query_as::<_, Bacenta>(&format!(
        "{SELECT_BACENTA} WHERE b.church_id = ? ORDER BY b.name COLLATE NOCASE"
    ))
    .bind(scope.church_id)
    .fetch_all(pool)
    .await?;

    Ok(bacentas)
}

pub async fn get_bacenta(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<Bacenta, ServiceError> {
    sqlx::query_as::<_, Bacenta>(&format!(
        "{SELECT_BACENTA} WHERE b.church_id = ? AND b.public_id = ?"
    ))
    .bind(scope.church_id)
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ServiceError::not_found("Bacenta not found"))
}

pub async fn create_bacenta(
    pool: &SqlitePool,
    scope: &TenantScope,
    name: &str,
) -> Result<Bacenta, ServiceError> {
    ensure(can_manage_bacentas(scope), "Only admins can manage bacentas")?;
    let name = clean_required(name, "name")?;
    let mut conn = pool.acquire().await?;
    ensure_name_free(&mut conn, scope.church_id, &name, None).await?;

    let public_id = new_public_id();
    let now = now();
    sqlx::query(
        "INSERT INTO bacentas (public_id, church_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&public_id)
    .bind(scope.church_id)
    .bind(&name)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    drop(conn);

    tracing::info!(church_id = scope.church_id, bacenta = %name, "bacenta created");
    get_bacenta(pool, scope, &public_id).await
}

pub async fn rename_bacenta(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
    name: &str,
) -> Result<Bacenta, ServiceError> {
    ensure(can_manage_bacentas(scope), "Only admins can manage bacentas")?;
    let name = clean_required(name, "name")?;
    let mut conn = pool.acquire().await?;
    let bacenta_id = bacenta_id_by_public(&mut conn, scope.church_id, public_id).await?;
    ensure_name_free(&mut conn, scope.church_id, &name, Some(bacenta_id)).await?;

    sqlx::query("UPDATE bacentas SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(now())
        .bind(bacenta_id)
        .execute(&mut *conn)
        .await?;
    drop(conn);

    get_bacenta(pool, scope, public_id).await
}

/// Delete a bacenta. Members stay; the bacenta is cleared as their primary
/// and dropped from every linked set.
pub async fn delete_bacenta(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<(), ServiceError> {
    ensure(can_manage_bacentas(scope), "Only admins can manage bacentas")?;
    let mut tx = pool.begin().await?;
    let bacenta_id = bacenta_id_by_public(&mut tx, scope.church_id, public_id).await?;
    let now = now();

    sqlx::query("UPDATE members SET bacenta_id = NULL, updated_at = ? WHERE bacenta_id = ?")
        .bind(&now)
        .bind(bacenta_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM member_linked_bacentas WHERE bacenta_id = ?")
        .bind(bacenta_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM bacentas WHERE id = ?")
        .bind(bacenta_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    tracing::info!(church_id = scope.church_id, bacenta_id, "bacenta deleted");
    Ok(())
}

pub async fn bacenta_id_by_public(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_id: &str,
) -> Result<i64, ServiceError> {
    sqlx::query_scalar("SELECT id FROM bacentas WHERE church_id = ? AND public_id = ?")
        .bind(church_id)
        .bind(public_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Bacenta not found"))
}

/// Internal id of the church bacenta whose name matches, ignoring case.
pub async fn bacenta_id_by_name(
    conn: &mut SqliteConnection,
    church_id: i64,
    name: &str,
) -> Result<Option<i64>, ServiceError> {
    let id = sqlx::query_scalar(
        "SELECT id FROM bacentas WHERE church_id = ? AND name = ? COLLATE NOCASE",
    )
    .bind(church_id)
    .bind(name.trim())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn bacenta_names(pool: &SqlitePool, church_id: i64) -> Result<Vec<String>, ServiceError> {
    let names = sqlx::query_scalar("SELECT name FROM bacentas WHERE church_id = ? ORDER BY name")
        .bind(church_id)
        .fetch_all(pool)
        .await?;
    Ok(names)
}

async fn ensure_name_free(
    conn: &mut SqliteConnection,
    church_id: i64,
    name: &str,
    except: Option<i64>,
) -> Result<(), ServiceError> {
    let clash: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM bacentas WHERE church_id = ? AND name = ? COLLATE NOCASE AND id IS NOT ?",
    )
    .bind(church_id)
    .bind(name)
    .bind(except)
    .fetch_optional(&mut *conn)
    .await?;

    match clash {
        Some(_) => Err(ServiceError::conflict(format!(
            "A bacenta named '{name}' already exists"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tenancy::own_scope;
    use crate::services::test_utils::*;

    #[tokio::test]
    async fn create_list_and_rename() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();

        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();
        create_bacenta(&pool, &scope, "airport").await.unwrap();
        assert_eq!(legon.member_count, 0);

        let names: Vec<_> = list_bacentas(&pool, &scope)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["airport", "Legon"]);

        let renamed = rename_bacenta(&pool, &scope, &legon.public_id, "Legon Hall")
            .await
            .unwrap();
        assert_eq!(renamed.name, "Legon Hall");
        // Renaming to its own name is fine.
        rename_bacenta(&pool, &scope, &legon.public_id, "legon hall")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_names_conflict_case_insensitively() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();

        create_bacenta(&pool, &scope, "Legon").await.unwrap();
        let err = create_bacenta(&pool, &scope, "LEGON").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn leaders_cannot_manage_bacentas() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let leader = create_leader_in(&pool, "kofi@example.com", admin.church_id.unwrap()).await;
        let scope = own_scope(&pool, &leader).await.unwrap();

        assert!(matches!(
            create_bacenta(&pool, &scope, "Legon").await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn delete_clears_primary_and_linked_references() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let church_id = admin.church_id.unwrap();
        let scope = own_scope(&pool, &admin).await.unwrap();
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let legon_id = bacenta_id_by_public(&mut conn, church_id, &legon.public_id)
            .await
            .unwrap();
        drop(conn);

        let primary = seed_member(&pool, church_id, "Ama").await;
        let linked = seed_member(&pool, church_id, "Kofi").await;
        sqlx::query("UPDATE members SET bacenta_id = ? WHERE id = ?")
            .bind(legon_id)
            .bind(primary)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO member_linked_bacentas (member_id, bacenta_id) VALUES (?, ?)")
            .bind(linked)
            .bind(legon_id)
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(get_bacenta(&pool, &scope, &legon.public_id).await.unwrap().member_count, 1);

        delete_bacenta(&pool, &scope, &legon.public_id).await.unwrap();

        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM members").await, 2);
        assert_eq!(
            count_rows(&pool, "SELECT COUNT(*) FROM members WHERE bacenta_id IS NOT NULL").await,
            0
        );
        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM member_linked_bacentas").await, 0);
        assert!(matches!(
            get_bacenta(&pool, &scope, &legon.public_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
