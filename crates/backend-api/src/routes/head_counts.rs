use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use crate::{
    routes::{
        church_scope,
        models::{DateQuery, HeadCountResponse, HeadCountsResponse, SetHeadCountRequest},
    },
    services::head_counts as head_count_service,
    state::ServerEvent,
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/head-counts",
    tag = "Head counts",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id"), DateQuery),
    responses(
        (status = 200, description = "Per-bacenta head counts and their total for the day", body = HeadCountsResponse)
    )
)]
pub async fn list_head_counts(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<DateQuery>,
) -> Result<Json<HeadCountsResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let (date, total, head_counts) =
        head_count_service::list_head_counts(state.db_pool(), &scope, &query.date).await?;

    Ok(Json(HeadCountsResponse {
        date,
        total,
        head_counts,
    }))
}

#[utoipa::path(
    put,
    path = "/api/churches/{church_id}/bacentas/{bacenta_id}/head-count",
    tag = "Head counts",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("bacenta_id" = String, Path, description = "Bacenta public id")
    ),
    request_body = SetHeadCountRequest,
    responses(
        (status = 200, description = "Head count stored, replacing any earlier value", body = HeadCountResponse),
        (status = 400, description = "Negative count or bad date", body = crate::error::ErrorResponse),
        (status = 403, description = "Read-only access", body = crate::error::ErrorResponse)
    )
)]
pub async fn set_head_count(
    State(state): State<AppState>,
    Path((church_id, bacenta_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<SetHeadCountRequest>,
) -> Result<Json<HeadCountResponse>, ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let head_count = head_count_service::set_head_count(
        state.db_pool(),
        &scope,
        &user,
        &bacenta_id,
        &payload.date,
        payload.count,
    )
    .await?;

    state
        .events()
        .to_church(
            &scope.church_public_id,
            ServerEvent::HeadCountChanged {
                church_id: scope.church_public_id.clone(),
                head_count: head_count.clone(),
            },
        )
        .await;

    Ok(Json(HeadCountResponse { head_count }))
}
