//! Attendance reporting computed straight from the attendance rows.
//!
//! Only active members count towards totals. Member marks are grouped by the
//! member's primary bacenta; members without one fall under "Unassigned".

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use super::members::member_id_by_public;
use super::ServiceError;
use crate::dates::{
    format_day, human_label, require_day, sunday_on_or_before, sundays_in_month, YEARS,
};
use crate::permissions::TenantScope;
use crate::routes::models::{
    AttendanceStatus, BacentaBreakdown, HistoryEntry, MemberHistory, MonthlyTrend, TrendPoint, WeeklySummary,
};

pub const UNASSIGNED: &str = "Unassigned";

/// Percentage of `present` in `total`, rounded to one decimal. Zero when nobody is expected.
pub fn attendance_rate(present: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (present as f64 * 1000.0 / total as f64).round() / 10.0
}

/// Summary of the Sunday on or before `date` (today when absent).
pub async fn weekly_summary(
    pool: &SqlitePool,
    scope: &TenantScope,
    date: Option<&str>,
) -> Result<WeeklySummary, ServiceError> {
    let requested = match date.map(str::trim).filter(|day| !day.is_empty()) {
        Some(day) => require_day(day, "date")?,
        None => Utc::now().date_naive(),
    };
    let sunday = sunday_on_or_before(requested)
        .ok_or_else(|| ServiceError::bad_request("date is out of range"))?;
    let day = format_day(sunday);

    let rows: Vec<(Option<String>, String, i64, i64, i64)> = sqlx::query_as(
        r#"
        SELECT b.public_id, b.name, COUNT(m.id),
               COALESCE(SUM(a.status = 'present'), 0),
               COALESCE(SUM(a.status = 'absent'), 0)
        FROM bacentas b
        LEFT JOIN members m ON m.bacenta_id = b.id AND m.is_active = 1
        LEFT JOIN attendance a ON a.member_id = m.id AND a.date = ?
        WHERE b.church_id = ?
        GROUP BY b.id
        ORDER BY b.name COLLATE NOCASE
        "#,
    )
    .bind(&day)
    .bind(scope.church_id)
    .fetch_all(pool)
    .await?;

    let unassigned: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(m.id),
               COALESCE(SUM(a.status = 'present'), 0),
               COALESCE(SUM(a.status = 'absent'), 0)
        FROM members m
        LEFT JOIN attendance a ON a.member_id = m.id AND a.date = ?
        WHERE m.church_id = ? AND m.is_active = 1 AND m.bacenta_id IS NULL
        "#,
    )
    .bind(&day)
    .bind(scope.church_id)
    .fetch_one(pool)
    .await?;

    let mut bacentas: Vec<BacentaBreakdown> = rows
        .into_iter()
        .map(|(bacenta_id, bacenta_name, total, present, absent)| BacentaBreakdown {
            bacenta_id,
            bacenta_name,
            total,
            present,
            absent,
        })
        .collect();
    if unassigned.0 > 0 {
        bacentas.push(BacentaBreakdown {
            bacenta_id: None,
            bacenta_name: UNASSIGNED.to_string(),
            total: unassigned.0,
            present: unassigned.1,
            absent: unassigned.2,
        });
    }

    let total_members: i64 = bacentas.iter().map(|row| row.total).sum();
    let present: i64 = bacentas.iter().map(|row| row.present).sum();
    let absent: i64 = bacentas.iter().map(|row| row.absent).sum();

    let (new_believers_present, guests, head_count_total): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM attendance
             WHERE church_id = ?1 AND date = ?2 AND new_believer_id IS NOT NULL AND status = 'present'),
            (SELECT COUNT(*) FROM guests WHERE church_id = ?1 AND date = ?2),
            (SELECT COALESCE(SUM(count), 0) FROM head_counts WHERE church_id = ?1 AND date = ?2)
        "#,
    )
    .bind(scope.church_id)
    .bind(&day)
    .fetch_one(pool)
    .await?;

    Ok(WeeklySummary {
        label: human_label(sunday),
        date: day,
        total_members,
        present,
        absent,
        unmarked: (total_members - present - absent).max(0),
        attendance_rate: attendance_rate(present, total_members),
        new_believers_present,
        guests,
        head_count_total,
        bacentas,
    })
}

/// Present count and rate for every Sunday of a month.
pub async fn monthly_trend(
    pool: &SqlitePool,
    scope: &TenantScope,
    year: i32,
    month: u32,
) -> Result<MonthlyTrend, ServiceError> {
    if !(1..=12).contains(&month) {
        return Err(ServiceError::bad_request("month must be between 1 and 12"));
    }
    if !YEARS.contains(&year) {
        return Err(ServiceError::bad_request(format!(
            "year must be between {} and {}",
            YEARS.start(),
            YEARS.end()
        )));
    }
    let sundays = sundays_in_month(year, month);
    let (Some(first), Some(last)) = (sundays.first(), sundays.last()) else {
        return Err(ServiceError::bad_request("year is out of range"));
    };

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE church_id = ? AND is_active = 1")
            .bind(scope.church_id)
            .fetch_one(pool)
            .await?;

    let present_by_day: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT a.date, COUNT(*)
        FROM attendance a
        JOIN members m ON m.id = a.member_id
        WHERE a.church_id = ? AND m.is_active = 1 AND a.status = 'present'
          AND a.date BETWEEN ? AND ?
        GROUP BY a.date
        "#,
    )
    .bind(scope.church_id)
    .bind(format_day(*first))
    .bind(format_day(*last))
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    let weeks = sundays
        .iter()
        .map(|sunday| {
            let date = format_day(*sunday);
            let present = present_by_day.get(&date).copied().unwrap_or(0);
            TrendPoint {
                date,
                present,
                total,
                rate: attendance_rate(present, total),
            }
        })
        .collect();

    Ok(MonthlyTrend { year, month, weeks })
}

pub async fn member_history(
    pool: &SqlitePool,
    scope: &TenantScope,
    member_public_id: &str,
    from: &str,
    to: &str,
) -> Result<MemberHistory, ServiceError> {
    let from: NaiveDate = require_day(from, "from")?;
    let to: NaiveDate = require_day(to, "to")?;
    if from > to {
        return Err(ServiceError::bad_request("from must not be after to"));
    }

    let mut conn = pool.acquire().await?;
    let member_id = member_id_by_public(&mut conn, scope.church_id, member_public_id).await?;

    let records = sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT date, status
        FROM attendance
        WHERE member_id = ? AND date BETWEEN ? AND ?
        ORDER BY date
        "#,
    )
    .bind(member_id)
    .bind(format_day(from))
    .bind(format_day(to))
    .fetch_all(&mut *conn)
    .await?;

    let present = records
        .iter()
        .filter(|entry| entry.status == AttendanceStatus::Present)
        .count() as i64;

    Ok(MemberHistory {
        member_id: member_public_id.to_string(),
        from: format_day(from),
        to: format_day(to),
        present,
        absent: records.len() as i64 - present,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::models::{CreateMemberRequest, Member};
    use crate::services::attendance::mark_member;
    use crate::services::bacentas::create_bacenta;
    use crate::services::members::{create_member, set_member_active};
    use crate::services::tenancy::own_scope;
    use crate::services::test_utils::*;
    use flock_auth::User;

    async fn member(pool: &SqlitePool, scope: &TenantScope, name: &str, bacenta: Option<&str>) -> Member {
        create_member(
            pool,
            scope,
            CreateMemberRequest {
                first_name: name.into(),
                bacenta_id: bacenta.map(str::to_string),
                ..CreateMemberRequest::default()
            },
        )
        .await
        .unwrap()
    }

    async fn mark(pool: &SqlitePool, scope: &TenantScope, user: &User, member: &Member, day: &str, status: AttendanceStatus) {
        mark_member(pool, scope, user, &member.id, day, status).await.unwrap();
    }

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(attendance_rate(0, 0), 0.0);
        assert_eq!(attendance_rate(1, 3), 33.3);
        assert_eq!(attendance_rate(2, 3), 66.7);
        assert_eq!(attendance_rate(4, 4), 100.0);
    }

    #[tokio::test]
    async fn weekly_summary_breaks_down_by_primary_bacenta() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();
        let legon = create_bacenta(&pool, &scope, "Legon").await.unwrap();
        create_bacenta(&pool, &scope, "Airport").await.unwrap();

        let kofi = member(&pool, &scope, "Kofi", Some(&legon.public_id)).await;
        let ama = member(&pool, &scope, "Ama", Some(&legon.public_id)).await;
        let yaw = member(&pool, &scope, "Yaw", None).await;
        let gone = member(&pool, &scope, "Esi", None).await;
        set_member_active(&pool, &scope, &gone.id, false).await.unwrap();

        // 2024-01-07 is a Sunday.
        mark(&pool, &scope, &admin, &kofi, "2024-01-07", AttendanceStatus::Present).await;
        mark(&pool, &scope, &admin, &ama, "2024-01-07", AttendanceStatus::Absent).await;
        mark(&pool, &scope, &admin, &yaw, "2024-01-07", AttendanceStatus::Present).await;

        let summary = weekly_summary(&pool, &scope, Some("2024-01-10")).await.unwrap();
        assert_eq!(summary.date, "2024-01-07");
        assert_eq!(summary.label, "Sunday, 7 January 2024");
        assert_eq!(summary.total_members, 3);
        assert_eq!(summary.present, 2);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.unmarked, 0);
        assert_eq!(summary.attendance_rate, 66.7);

        let names: Vec<_> = summary.bacentas.iter().map(|b| b.bacenta_name.as_str()).collect();
        assert_eq!(names, ["Airport", "Legon", UNASSIGNED]);
        assert_eq!(summary.bacentas[0].total, 0);
        assert_eq!(summary.bacentas[1].present, 1);
        assert_eq!(summary.bacentas[1].absent, 1);
        assert_eq!(summary.bacentas[2].total, 1);
    }

    #[tokio::test]
    async fn monthly_trend_has_one_point_per_sunday() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();
        let kofi = member(&pool, &scope, "Kofi", None).await;
        member(&pool, &scope, "Ama", None).await;

        mark(&pool, &scope, &admin, &kofi, "2024-01-14", AttendanceStatus::Present).await;

        let trend = monthly_trend(&pool, &scope, 2024, 1).await.unwrap();
        let days: Vec<_> = trend.weeks.iter().map(|w| w.date.as_str()).collect();
        assert_eq!(days, ["2024-01-07", "2024-01-14", "2024-01-21", "2024-01-28"]);
        assert_eq!(trend.weeks[1].present, 1);
        assert_eq!(trend.weeks[1].rate, 50.0);
        assert_eq!(trend.weeks[0].present, 0);

        assert!(matches!(
            monthly_trend(&pool, &scope, 2024, 13).await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn monthly_trend_rejects_years_beyond_the_calendar() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();

        for year in [0, 10_000, 262_143, i32::MAX] {
            assert!(matches!(
                monthly_trend(&pool, &scope, year, 12).await,
                Err(ServiceError::BadRequest(_))
            ));
        }
        assert_eq!(monthly_trend(&pool, &scope, 9999, 12).await.unwrap().weeks.len(), 4);
    }

    #[tokio::test]
    async fn member_history_covers_the_requested_range() {
        let (pool, _dir) = create_test_db().await;
        let admin = create_admin_with_church(&pool, "ama@example.com", "Grace").await;
        let scope = own_scope(&pool, &admin).await.unwrap();
        let kofi = member(&pool, &scope, "Kofi", None).await;

        mark(&pool, &scope, &admin, &kofi, "2023-12-31", AttendanceStatus::Present).await;
        mark(&pool, &scope, &admin, &kofi, "2024-01-07", AttendanceStatus::Present).await;
        mark(&pool, &scope, &admin, &kofi, "2024-01-14", AttendanceStatus::Absent).await;

        let history = member_history(&pool, &scope, &kofi.id, "2024-01-01", "2024-01-31")
            .await
            .unwrap();
        assert_eq!(history.records.len(), 2);
        assert_eq!(history.present, 1);
        assert_eq!(history.absent, 1);
        assert_eq!(history.records[0].date, "2024-01-07");

        assert!(matches!(
            member_history(&pool, &scope, &kofi.id, "2024-02-01", "2024-01-01").await,
            Err(ServiceError::BadRequest(_))
        ));
    }
}
