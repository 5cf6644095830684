use flock_auth::{new_public_id, User};
use sqlx::{SqliteConnection, SqlitePool};

use super::bacentas::bacenta_id_by_public;
use super::members::{insert_member, load_member, NewMember};
use super::{now, ServiceError};
use crate::dates::{format_day, require_day};
use crate::permissions::{can_edit_records, ensure, TenantScope};
use crate::routes::models::{CreateGuestRequest, Guest, GuestFilter, Member, MemberRole};
use crate::util::{clean_optional, clean_required};

const EDIT_DENIED: &str = "You cannot edit records in this church";

const SELECT_GUEST: &str = r#"
    SELECT g.public_id, b.public_id AS bacenta_public_id, g.first_name, g.last_name, g.phone,
           g.date, m.public_id AS converted_member_public_id, g.created_at
    FROM guests g
    LEFT JOIN bacentas b ON b.id = g.bacenta_id
    LEFT JOIN members m ON m.id = g.converted_member_id
"#;

pub async fn create_guest(
    pool: &SqlitePool,
    scope: &TenantScope,
    creator: &User,
    request: CreateGuestRequest,
) -> Result<Guest, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;
    let first_name = clean_required(&request.first_name, "first_name")?;
    let date = format_day(require_day(&request.date, "date")?);

    let mut conn = pool.acquire().await?;
    let bacenta_id = match clean_optional(request.bacenta_id) {
        Some(public_id) => Some(bacenta_id_by_public(&mut conn, scope.church_id, &public_id).await?),
        None => None,
    };

    let public_id = new_public_id();
    sqlx::query(
        r#"
        INSERT INTO guests (public_id, church_id, bacenta_id, first_name, last_name, phone, date, created_by_user_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(scope.church_id)
    .bind(bacenta_id)
    .bind(&first_name)
    .bind(clean_optional(request.last_name))
    .bind(clean_optional(request.phone))
    .bind(&date)
    .bind(creator.id)
    .bind(now())
    .execute(&mut *conn)
    .await?;

    load_guest(&mut conn, scope.church_id, &public_id).await
}

pub async fn list_guests(
    pool: &SqlitePool,
    scope: &TenantScope,
    filter: GuestFilter,
) -> Result<Vec<Guest>, ServiceError> {
    let date = match clean_optional(filter.date) {
        Some(day) => Some(format_day(require_day(&day, "date")?)),
        None => None,
    };
    let bacenta = clean_optional(filter.bacenta_id);

    let guests = sqlx::query_as::<_, Guest>(&format!(
        r#"{SELECT_GUEST}
        WHERE g.church_id = ?
          AND (? IS NULL OR g.date = ?)
          AND (? IS NULL OR b.public_id = ?)
        ORDER BY g.date DESC, g.first_name COLLATE NOCASE
        "#
    ))
    .bind(scope.church_id)
    .bind(date.as_deref())
    .bind(date.as_deref())
    .bind(bacenta.as_deref())
    .bind(bacenta.as_deref())
    .fetch_all(pool)
    .await?;

    Ok(guests)
}

pub async fn delete_guest(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<(), ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let result = sqlx::query("DELETE FROM guests WHERE church_id = ? AND public_id = ?")
        .bind(scope.church_id)
        .bind(public_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Guest not found"));
    }
    Ok(())
}

/// Turn a guest into a member, keeping the guest's bacenta as primary.
pub async fn convert_to_member(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<(Guest, Member), ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut tx = pool.begin().await?;
    let (guest_id, bacenta_id, first_name, last_name, phone, converted): (
        i64,
        Option<i64>,
        String,
        Option<String>,
        Option<String>,
        Option<i64>,
    ) = sqlx::query_as(
        r#"
        SELECT id, bacenta_id, first_name, last_name, phone, converted_member_id
        FROM guests
        WHERE church_id = ? AND public_id = ?
        "#,
    )
    .bind(scope.church_id)
    .bind(public_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ServiceError::not_found("Guest not found"))?;

    if converted.is_some() {
        return Err(ServiceError::conflict("Guest was already converted"));
    }

    let fields = NewMember {
        first_name,
        last_name,
        phone,
        role: MemberRole::Member,
        bacenta_id,
        ..NewMember::default()
    };
    let (member_id, member_public_id) = insert_member(&mut tx, scope.church_id, &fields).await?;

    sqlx::query("UPDATE guests SET converted_member_id = ? WHERE id = ?")
        .bind(member_id)
        .bind(guest_id)
        .execute(&mut *tx)
        .await?;

    let guest = load_guest(&mut tx, scope.church_id, public_id).await?;
    let member = load_member(&mut tx, scope.church_id, &member_public_id).await?;
    tx.commit().await?;
    Ok((guest, member))
}

async fn load_guest(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_id: &str,
) -> Result<Guest, ServiceError> {
    sqlx::query_as::<_, Guest>(&format!(
        "{SELECT_GUEST} WHERE g.church_id = ? AND g.public_id = ?"
    ))
    .bind(church_id)
    .bind(public_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("Guest not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bacentas::create_bacenta;
    use crate::services::tenancy::own_scope;
    use crate::services::test_utils::*;

    fn guest(name: &str, date: &str, bacenta: Option<&str>) -> CreateGuestRequest {
        CreateGuestRequest {
            first_name: name.into(),
            last_name: None,
            phone: Some("0244000000".into()),
            date: date.into(),
            bacenta_id: bacenta.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn guests_filter_by_date_and_bacenta() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();

        create_guest(&pool, &scope, &admin, guest("Abena", "2024-01-07", Some(&legon.public_id)))
            .await
            .unwrap();
        create_guest(&pool, &scope, &admin, guest("Kojo", "2024-01-07", None))
            .await
            .unwrap();
        create_guest(&pool, &scope, &admin, guest("Efua", "2024-01-14", None))
            .await
            .unwrap();

        let sunday = list_guests(
            &pool,
            &scope,
            GuestFilter {
                date: Some("2024-01-07".into()),
                bacenta_id: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(sunday.len(), 2);

        let legon_guests = list_guests(
            &pool,
            &scope,
            GuestFilter {
                date: None,
                bacenta_id: Some(legon.public_id.clone()),
            },
        )
        .await
        .unwrap();
        assert_eq!(legon_guests.len(), 1);
        assert_eq!(legon_guests[0].first_name, "Abena");
    }

    #[tokio::test]
    async fn conversion_and_deletion() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();
        let created =
            create_guest(&pool, &scope, &admin, guest("Abena", "2024-01-07", Some(&legon.public_id)))
                .await
                .unwrap();

        let (converted, member) = convert_to_member(&pool, &scope, &created.public_id)
            .await
            .unwrap();
        assert_eq!(converted.converted_member_public_id.as_deref(), Some(member.id.as_str()));
        assert_eq!(member.bacenta_id.as_deref(), Some(legon.public_id.as_str()));
        assert_eq!(member.phone.as_deref(), Some("0244000000"));

        assert!(matches!(
            convert_to_member(&pool, &scope, &created.public_id).await,
            Err(ServiceError::Conflict(_))
        ));

        delete_guest(&pool, &scope, &created.public_id).await.unwrap();
        assert_eq!(count_rows(&pool, "SELECT COUNT(*) FROM members").await, 1);
    }

    #[tokio::test]
    async fn invalid_dates_are_rejected() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();

        assert!(matches!(
            create_guest(&pool, &scope, &admin, guest("Abena", "Sunday", None)).await,
            Err(ServiceError::BadRequest(_))
        ));
    }
}
