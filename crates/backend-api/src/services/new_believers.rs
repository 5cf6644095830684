use flock_auth::new_public_id;
use sqlx::{SqliteConnection, SqlitePool};

use super::bacentas::bacenta_id_by_public;
use super::members::{insert_member, load_member, NewMember};
use super::{now, ServiceError};
use crate::dates::{format_day, require_day};
use crate::permissions::{can_edit_records, ensure, TenantScope};
use crate::routes::models::{
    FollowUpStatus, Member, MemberRole, NewBeliever, NewBelieverFilter, NewBelieverRequest,
};
use crate::util::{clean_optional, clean_required};

const EDIT_DENIED: &str = "You cannot edit records in this church";

const SELECT_NEW_BELIEVER: &str = r#"
    SELECT n.public_id, n.name, n.surname, n.contact, n.date_of_visit, n.residence,
           n.studies, n.campus, n.occupation, n.year, n.is_first_time, n.ministry,
           n.follow_up_status, n.follow_up_notes,
           m.public_id AS converted_member_public_id, n.created_at, n.updated_at
    FROM new_believers n
    LEFT JOIN members m ON m.id = n.converted_member_id
"#;

pub async fn list_new_believers(
    pool: &SqlitePool,
    scope: &TenantScope,
    filter: NewBelieverFilter,
) -> Result<Vec<NewBeliever>, ServiceError> {
    let search = clean_optional(filter.search).map(|term| format!("%{}%", term.to_lowercase()));

    let rows = sqlx::query_as::<_, NewBeliever>(&format!(
        r#"{SELECT_NEW_BELIEVER}
        WHERE n.church_id = ?
          AND (? IS NULL OR n.follow_up_status = ?)
          AND (? IS NULL OR lower(n.name || ' ' || COALESCE(n.surname, '') || ' ' || COALESCE(n.contact, '')) LIKE ?)
        ORDER BY n.date_of_visit DESC, n.name COLLATE NOCASE
        "#
    ))
    .bind(scope.church_id)
    .bind(filter.follow_up_status)
    .bind(filter.follow_up_status)
    .bind(search.as_deref())
    .bind(search.as_deref())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn get_new_believer(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<NewBeliever, ServiceError> {
    let mut conn = pool.acquire().await?;
    load_new_believer(&mut conn, scope.church_id, public_id).await
}

/// `name` and `date_of_visit` are required on create.
pub async fn create_new_believer(
    pool: &SqlitePool,
    scope: &TenantScope,
    request: NewBelieverRequest,
) -> Result<NewBeliever, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let name = clean_required(request.name.as_deref().unwrap_or(""), "name")?;
    let visit = request
        .date_of_visit
        .as_deref()
        .ok_or_else(|| ServiceError::bad_request("date_of_visit is required"))?;
    let date_of_visit = format_day(require_day(visit, "date_of_visit")?);

    let public_id = new_public_id();
    let now = now();
    sqlx::query(
        r#"
        INSERT INTO new_believers (
            public_id, church_id, name, surname, contact, date_of_visit, residence, studies,
            campus, occupation, year, is_first_time, ministry, follow_up_status,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(scope.church_id)
    .bind(&name)
    .bind(clean_optional(request.surname))
    .bind(clean_optional(request.contact))
    .bind(&date_of_visit)
    .bind(clean_optional(request.residence))
    .bind(clean_optional(request.studies))
    .bind(clean_optional(request.campus))
    .bind(clean_optional(request.occupation))
    .bind(clean_optional(request.year))
    .bind(request.is_first_time.unwrap_or(true))
    .bind(clean_optional(request.ministry))
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_new_believer(pool, scope, &public_id).await
}

/// Omitted fields are unchanged; blank optional text clears the field.
pub async fn update_new_believer(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
    request: NewBelieverRequest,
) -> Result<NewBeliever, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut tx = pool.begin().await?;
    let id = new_believer_id_by_public(&mut tx, scope.church_id, public_id).await?;
    let now = now();

    if let Some(name) = request.name {
        let name = clean_required(&name, "name")?;
        set_text(&mut tx, id, "name", Some(name), &now).await?;
    }
    if let Some(visit) = request.date_of_visit {
        let day = format_day(require_day(&visit, "date_of_visit")?);
        set_text(&mut tx, id, "date_of_visit", Some(day), &now).await?;
    }

    let optional_fields = [
        ("surname", request.surname),
        ("contact", request.contact),
        ("residence", request.residence),
        ("studies", request.studies),
        ("campus", request.campus),
        ("occupation", request.occupation),
        ("year", request.year),
        ("ministry", request.ministry),
    ];
    for (column, value) in optional_fields {
        if let Some(value) = value {
            set_text(&mut tx, id, column, clean_optional(Some(value)), &now).await?;
        }
    }

    if let Some(first_time) = request.is_first_time {
        sqlx::query("UPDATE new_believers SET is_first_time = ?, updated_at = ? WHERE id = ?")
            .bind(first_time)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let believer = load_new_believer(&mut tx, scope.church_id, public_id).await?;
    tx.commit().await?;
    Ok(believer)
}

pub async fn delete_new_believer(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
) -> Result<(), ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let result = sqlx::query("DELETE FROM new_believers WHERE church_id = ? AND public_id = ?")
        .bind(scope.church_id)
        .bind(public_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("New believer not found"));
    }
    Ok(())
}

pub async fn set_follow_up(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
    status: FollowUpStatus,
    notes: Option<String>,
) -> Result<NewBeliever, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut conn = pool.acquire().await?;
    let id = new_believer_id_by_public(&mut conn, scope.church_id, public_id).await?;

    // Notes are only replaced when supplied.
    sqlx::query(
        r#"
        UPDATE new_believers
        SET follow_up_status = ?,
            follow_up_notes = CASE WHEN ? THEN ? ELSE follow_up_notes END,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(notes.is_some())
    .bind(clean_optional(notes))
    .bind(now())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    load_new_believer(&mut conn, scope.church_id, public_id).await
}

/// Create a member from a new believer and link the two. The follow-up status
/// becomes `integrated`.
pub async fn convert_to_member(
    pool: &SqlitePool,
    scope: &TenantScope,
    public_id: &str,
    bacenta_public_id: Option<String>,
) -> Result<(NewBeliever, Member), ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;

    let mut tx = pool.begin().await?;
    let believer = load_new_believer(&mut tx, scope.church_id, public_id).await?;
    if believer.converted_member_public_id.is_some() {
        return Err(ServiceError::conflict("New believer was already converted"));
    }

    let bacenta_id = match clean_optional(bacenta_public_id) {
        Some(bacenta) => Some(bacenta_id_by_public(&mut tx, scope.church_id, &bacenta).await?),
        None => None,
    };

    let fields = NewMember {
        first_name: believer.name.clone(),
        last_name: believer.surname.clone(),
        phone: believer.contact.clone(),
        building_address: believer.residence.clone(),
        born_again: true,
        role: MemberRole::Member,
        bacenta_id,
        ..NewMember::default()
    };
    let (member_id, member_public_id) = insert_member(&mut tx, scope.church_id, &fields).await?;

    sqlx::query(
        r#"
        UPDATE new_believers
        SET converted_member_id = ?, follow_up_status = 'integrated', updated_at = ?
        WHERE church_id = ? AND public_id = ?
        "#,
    )
    .bind(member_id)
    .bind(now())
    .bind(scope.church_id)
    .bind(public_id)
    .execute(&mut *tx)
    .await?;

    let believer = load_new_believer(&mut tx, scope.church_id, public_id).await?;
    let member = load_member(&mut tx, scope.church_id, &member_public_id).await?;
    tx.commit().await?;

    tracing::info!(church_id = scope.church_id, member = %member.id, "new believer converted");
    Ok((believer, member))
}

pub async fn new_believer_id_by_public(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_id: &str,
) -> Result<i64, ServiceError> {
    sqlx::query_scalar("SELECT id FROM new_believers WHERE church_id = ? AND public_id = ?")
        .bind(church_id)
        .bind(public_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("New believer not found"))
}

async fn load_new_believer(
    conn: &mut SqliteConnection,
    church_id: i64,
    public_id: &str,
) -> Result<NewBeliever, ServiceError> {
    sqlx::query_as::<_, NewBeliever>(&format!(
        "{SELECT_NEW_BELIEVER} WHERE n.church_id = ? AND n.public_id = ?"
    ))
    .bind(church_id)
    .bind(public_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::not_found("New believer not found"))
}

async fn set_text(
    conn: &mut SqliteConnection,
    id: i64,
    column: &'static str,
    value: Option<String>,
    now: &str,
) -> Result<(), ServiceError> {
    sqlx::query(&format!(
        "UPDATE new_believers SET {column} = ?, updated_at = ? WHERE id = ?"
    ))
    .bind(value)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
