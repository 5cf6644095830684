use flock_auth::User;
use sqlx::SqlitePool;

use super::bacentas::bacenta_id_by_public;
use super::members::member_id_by_public;
use super::new_believers::new_believer_id_by_public;
use super::{now, ServiceError};
use crate::dates::{format_day, require_day};
use crate::permissions::{can_edit_records, ensure, TenantScope};
use crate::routes::models::{AttendanceRecord, AttendanceStatus, AttendanceSubject};

const EDIT_DENIED: &str = "You cannot record attendance in this church";

/// Mark a member present or absent for a day. Marking again replaces the status.
pub async fn mark_member(
    pool: &SqlitePool,
    scope: &TenantScope,
    recorder: &User,
    member_public_id: &str,
    date: &str,
    status: AttendanceStatus,
) -> Result<AttendanceRecord, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;
    let date = format_day(require_day(date, "date")?);

    let mut conn = pool.acquire().await?;
    let member_id = member_id_by_public(&mut conn, scope.church_id, member_public_id).await?;
    let updated_at = now();

    sqlx::query(
        r#"
        INSERT INTO attendance (church_id, member_id, date, status, recorded_by_user_id, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (member_id, date) DO UPDATE SET
            status = excluded.status,
            recorded_by_user_id = excluded.recorded_by_user_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(scope.church_id)
    .bind(member_id)
    .bind(&date)
    .bind(status)
    .bind(recorder.id)
    .bind(&updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(AttendanceRecord {
        subject: AttendanceSubject::Member,
        subject_id: member_public_id.to_string(),
        date,
        status,
        updated_at,
    })
}

pub async fn mark_new_believer(
    pool: &SqlitePool,
    scope: &TenantScope,
    recorder: &User,
    new_believer_public_id: &str,
    date: &str,
    status: AttendanceStatus,
) -> Result<AttendanceRecord, ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;
    let date = format_day(require_day(date, "date")?);

    let mut conn = pool.acquire().await?;
    let believer_id =
        new_believer_id_by_public(&mut conn, scope.church_id, new_believer_public_id).await?;
    let updated_at = now();

    sqlx::query(
        r#"
        INSERT INTO attendance (church_id, new_believer_id, date, status, recorded_by_user_id, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (new_believer_id, date) DO UPDATE SET
            status = excluded.status,
            recorded_by_user_id = excluded.recorded_by_user_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(scope.church_id)
    .bind(believer_id)
    .bind(&date)
    .bind(status)
    .bind(recorder.id)
    .bind(&updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(AttendanceRecord {
        subject: AttendanceSubject::NewBeliever,
        subject_id: new_believer_public_id.to_string(),
        date,
        status,
        updated_at,
    })
}

/// Remove a mark so the subject counts as unmarked again.
pub async fn clear_mark(
    pool: &SqlitePool,
    scope: &TenantScope,
    subject: AttendanceSubject,
    subject_public_id: &str,
    date: &str,
) -> Result<(), ServiceError> {
    ensure(can_edit_records(scope), EDIT_DENIED)?;
    let date = format_day(require_day(date, "date")?);

    let mut conn = pool.acquire().await?;
    let result = match subject {
        AttendanceSubject::Member => {
            let id = member_id_by_public(&mut conn, scope.church_id, subject_public_id).await?;
            sqlx::query("DELETE FROM attendance WHERE member_id = ? AND date = ?")
                .bind(id)
                .bind(&date)
                .execute(&mut *conn)
                .await?
        }
        AttendanceSubject::NewBeliever => {
            let id =
                new_believer_id_by_public(&mut conn, scope.church_id, subject_public_id).await?;
            sqlx::query("DELETE FROM attendance WHERE new_believer_id = ? AND date = ?")
                .bind(id)
                .bind(&date)
                .execute(&mut *conn)
                .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("No attendance mark for that day"));
    }
    Ok(())
}

/// Every mark for a day. With a bacenta, only members whose primary bacenta
/// it is are returned.
pub async fn list_by_date(
    pool: &SqlitePool,
    scope: &TenantScope,
    date: &str,
    bacenta_public_id: Option<&str>,
) -> Result<Vec<AttendanceRecord>, ServiceError> {
    let date = format_day(require_day(date, "date")?);

    let bacenta_id = match bacenta_public_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(public_id) => {
            let mut conn = pool.acquire().await?;
            Some(bacenta_id_by_public(&mut conn, scope.church_id, public_id).await?)
        }
        None => None,
    };

    let rows: Vec<(Option<String>, Option<String>, AttendanceStatus, String)> = sqlx::query_as(
        r#"
        SELECT m.public_id, n.public_id, a.status, a.updated_at
        FROM attendance a
        LEFT JOIN members m ON m.id = a.member_id
        LEFT JOIN new_believers n ON n.id = a.new_believer_id
        WHERE a.church_id = ? AND a.date = ?
          AND (? IS NULL OR m.bacenta_id = ?)
        ORDER BY a.member_id IS NULL, a.id
        "#,
    )
    .bind(scope.church_id)
    .bind(&date)
    .bind(bacenta_id)
    .bind(bacenta_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(member, believer, status, updated_at)| {
            let (subject, subject_id) = match (member, believer) {
                (Some(id), _) => (AttendanceSubject::Member, id),
                (None, Some(id)) => (AttendanceSubject::NewBeliever, id),
                (None, None) => return None,
            };
            Some(AttendanceRecord {
                subject,
                subject_id,
                date: date.clone(),
                status,
                updated_at,
            })
        })
        .collect())
}
