use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use crate::{
    routes::{
        church_scope,
        models::{
            HistoryQuery, MemberHistory, MonthlyQuery, MonthlyTrend, WeeklyQuery, WeeklySummary,
        },
    },
    services::analytics as analytics_service,
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/analytics/weekly",
    tag = "Analytics",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id"), WeeklyQuery),
    responses(
        (status = 200, description = "Attendance summary for one Sunday", body = WeeklySummary),
        (status = 400, description = "Invalid date", body = crate::error::ErrorResponse)
    )
)]
pub async fn weekly_summary(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<WeeklyQuery>,
) -> Result<Json<WeeklySummary>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let summary =
        analytics_service::weekly_summary(state.db_pool(), &scope, query.date.as_deref()).await?;

    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/analytics/monthly",
    tag = "Analytics",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id"), MonthlyQuery),
    responses(
        (status = 200, description = "Attendance rate for each Sunday of the month", body = MonthlyTrend),
        (status = 400, description = "Invalid month", body = crate::error::ErrorResponse)
    )
)]
pub async fn monthly_trend(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<MonthlyQuery>,
) -> Result<Json<MonthlyTrend>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let trend =
        analytics_service::monthly_trend(state.db_pool(), &scope, query.year, query.month).await?;

    Ok(Json(trend))
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/members/{member_id}/history",
    tag = "Analytics",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "A member's marks between two days, inclusive", body = MemberHistory),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn member_history(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MemberHistory>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let history = analytics_service::member_history(
        state.db_pool(),
        &scope,
        &member_id,
        &query.from,
        &query.to,
    )
    .await?;

    Ok(Json(history))
}
