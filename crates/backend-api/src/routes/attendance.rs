use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    dates::{format_day, require_day},
    permissions::TenantScope,
    routes::{
        church_scope,
        models::{
            AttendanceQuery, AttendanceRecord, AttendanceRecordResponse, AttendanceResponse,
            AttendanceSubject, DateQuery, MarkAttendanceRequest,
        },
    },
    services::attendance as attendance_service,
    state::ServerEvent,
    ApiError, AppState,
};

async fn announce_mark(state: &AppState, scope: &TenantScope, record: &AttendanceRecord) {
    state
        .events()
        .to_church(
            &scope.church_public_id,
            ServerEvent::AttendanceChanged {
                church_id: scope.church_public_id.clone(),
                date: record.date.clone(),
                subject: record.subject,
                subject_id: record.subject_id.clone(),
                status: Some(record.status),
            },
        )
        .await;
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/attendance",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id"), AttendanceQuery),
    responses(
        (status = 200, description = "Marks recorded for the day", body = AttendanceResponse),
        (status = 400, description = "Invalid date", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_attendance(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let date = format_day(require_day(&query.date, "date")?);
    let records = attendance_service::list_by_date(
        state.db_pool(),
        &scope,
        &date,
        query.bacenta_id.as_deref(),
    )
    .await?;

    Ok(Json(AttendanceResponse { date, records }))
}

#[utoipa::path(
    put,
    path = "/api/churches/{church_id}/attendance/members/{member_id}",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id")
    ),
    request_body = MarkAttendanceRequest,
    responses(
        (status = 200, description = "Mark recorded; replaces any earlier mark for the day", body = AttendanceRecordResponse),
        (status = 400, description = "Invalid date", body = crate::error::ErrorResponse),
        (status = 403, description = "Read-only access", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_member(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<MarkAttendanceRequest>,
) -> Result<Json<AttendanceRecordResponse>, ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let record = attendance_service::mark_member(
        state.db_pool(),
        &scope,
        &user,
        &member_id,
        &payload.date,
        payload.status,
    )
    .await?;
    announce_mark(&state, &scope, &record).await;

    Ok(Json(AttendanceRecordResponse { record }))
}

#[utoipa::path(
    put,
    path = "/api/churches/{church_id}/attendance/new-believers/{new_believer_id}",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("new_believer_id" = String, Path, description = "New believer public id")
    ),
    request_body = MarkAttendanceRequest,
    responses(
        (status = 200, description = "Mark recorded", body = AttendanceRecordResponse),
        (status = 403, description = "Read-only access", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_new_believer(
    State(state): State<AppState>,
    Path((church_id, new_believer_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<MarkAttendanceRequest>,
) -> Result<Json<AttendanceRecordResponse>, ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let record = attendance_service::mark_new_believer(
        state.db_pool(),
        &scope,
        &user,
        &new_believer_id,
        &payload.date,
        payload.status,
    )
    .await?;
    announce_mark(&state, &scope, &record).await;

    Ok(Json(AttendanceRecordResponse { record }))
}

#[utoipa::path(
    delete,
    path = "/api/churches/{church_id}/attendance/members/{member_id}",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id"),
        DateQuery
    ),
    responses(
        (status = 204, description = "Mark cleared; the member is unmarked for the day"),
        (status = 404, description = "No mark for that day", body = crate::error::ErrorResponse)
    )
)]
pub async fn clear_member(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<DateQuery>,
) -> Result<StatusCode, ApiError> {
    clear(&state, &headers, &church_id, AttendanceSubject::Member, &member_id, &query.date).await
}

#[utoipa::path(
    delete,
    path = "/api/churches/{church_id}/attendance/new-believers/{new_believer_id}",
    tag = "Attendance",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("new_believer_id" = String, Path, description = "New believer public id"),
        DateQuery
    ),
    responses(
        (status = 204, description = "Mark cleared"),
        (status = 404, description = "No mark for that day", body = crate::error::ErrorResponse)
    )
)]
pub async fn clear_new_believer(
    State(state): State<AppState>,
    Path((church_id, new_believer_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<DateQuery>,
) -> Result<StatusCode, ApiError> {
    clear(
        &state,
        &headers,
        &church_id,
        AttendanceSubject::NewBeliever,
        &new_believer_id,
        &query.date,
    )
    .await
}

async fn clear(
    state: &AppState,
    headers: &HeaderMap,
    church_id: &str,
    subject: AttendanceSubject,
    subject_id: &str,
    date: &str,
) -> Result<StatusCode, ApiError> {
    let (_, scope) = church_scope(state, headers, church_id).await?;
    let date = format_day(require_day(date, "date")?);
    attendance_service::clear_mark(state.db_pool(), &scope, subject, subject_id, &date).await?;

    state
        .events()
        .to_church(
            &scope.church_public_id,
            ServerEvent::AttendanceChanged {
                church_id: scope.church_public_id.clone(),
                date,
                subject,
                subject_id: subject_id.to_string(),
                status: None,
            },
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
