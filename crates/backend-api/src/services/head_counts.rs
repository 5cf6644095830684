use flock_auth::User;
use sqlx::SqlitePool;

use super::bacentas::bacenta_id_by_public;
use super::{now, ServiceError};
use crate::dates::{format_day, require_day};
use crate::permissions::{can_edit_records, ensure, TenantScope};
use crate::routes::models::HeadCount;

const SELECT_HEAD_COUNT: &str = r#"
    SELECT b.public_id AS bacenta_public_id, b.name AS bacenta_name, h.date, h.count, h.updated_at
    FROM head_counts h
    JOIN bacentas b ON b.id = h.bacenta_id
"#;

/// Record the head count of a bacenta for a day, replacing any earlier value.
pub async fn set_head_count(
    pool: &SqlitePool,
    scope: &TenantScope,
    recorder: &User,
    bacenta_public_id: &str,
    date: &str,
    count: i64,
) -> Result<HeadCount, ServiceError> {
    ensure(can_edit_records(scope), "You cannot record head counts in this church")?;
    if count < 0 {
        return Err(ServiceError::bad_request("count must not be negative"));
    }
    let date = format_day(require_day(date, "date")?);

    let mut conn = pool.acquire().await?;
    let bacenta_id = bacenta_id_by_public(&mut conn, scope.church_id, bacenta_public_id).await?;

    sqlx::query(
        r#"
        INSERT INTO head_counts (church_id, bacenta_id, date, count, recorded_by_user_id, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (bacenta_id, date) DO UPDATE SET
            count = excluded.count,
            recorded_by_user_id = excluded.recorded_by_user_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(scope.church_id)
    .bind(bacenta_id)
    .bind(&date)
    .bind(count)
    .bind(recorder.id)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    let head_count = sqlx::query_as::<_, HeadCount>(&format!(
        "{SELECT_HEAD_COUNT} WHERE h.bacenta_id = ? AND h.date = ?"
    ))
    .bind(bacenta_id)
    .bind(&date)
    .fetch_one(&mut *conn)
    .await?;

    Ok(head_count)
}

/// Head counts for a day and their total.
pub async fn list_head_counts(
    pool: &SqlitePool,
    scope: &TenantScope,
    date: &str,
) -> Result<(String, i64, Vec<HeadCount>), ServiceError> {
    let date = format_day(require_day(date, "date")?);

    let counts = sqlx::query_as::<_, HeadCount>(&format!(
        "{SELECT_HEAD_COUNT} WHERE h.church_id = ? AND h.date = ? ORDER BY b.name COLLATE NOCASE"
    ))
    .bind(scope.church_id)
    .bind(&date)
    .fetch_all(pool)
    .await?;

    let total = counts.iter().map(|count| count.count).sum();
    Ok((date, total, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bacentas::create_bacenta;
    use crate::services::tenancy::own_scope;
    use crate::services::test_utils::*;

    #[tokio::test]
    async fn setting_again_replaces_the_count() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();
        let airport = create_bacenta(&pool, &scope, "Airport").await.unwrap();

        set_head_count(&pool, &scope, &admin, &legon.public_id, "2024-01-07", 30)
            .await
            .unwrap();
        let replaced = set_head_count(&pool, &scope, &admin, &legon.public_id, "2024-01-07", 42)
            .await
            .unwrap();
        assert_eq!(replaced.count, 42);
        set_head_count(&pool, &scope, &admin, &airport.public_id, "2024-01-07", 8)
            .await
            .unwrap();

        let (date, total, counts) = list_head_counts(&pool, &scope, "2024-01-07").await.unwrap();
        assert_eq!(date, "2024-01-07");
        assert_eq!(total, 50);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].bacenta_name, "Airport");
    }

    #[tokio::test]
    async fn negative_counts_are_rejected() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();

        let err = set_head_count(&pool, &scope, &admin, &legon.public_id, "2024-01-07", -1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM head_counts").await, 0);
    }
}
