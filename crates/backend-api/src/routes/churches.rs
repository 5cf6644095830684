use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::{
    routes::{
        church_scope, current_user,
        models::{ChurchResponse, ChurchesResponse, UpdateChurchRequest},
    },
    services::{churches as church_service, tenancy},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/churches",
    tag = "Churches",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "The caller's own church and churches shared with them", body = ChurchesResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_churches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChurchesResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let churches = tenancy::list_accessible_churches(state.db_pool(), &user).await?;

    Ok(Json(ChurchesResponse { churches }))
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}",
    tag = "Churches",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    responses(
        (status = 200, description = "Church details and the caller's access level", body = ChurchResponse),
        (status = 403, description = "No access to this church", body = crate::error::ErrorResponse),
        (status = 404, description = "Church not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_church(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ChurchResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let church = church_service::get_church(state.db_pool(), &scope).await?;

    Ok(Json(ChurchResponse { church }))
}

#[utoipa::path(
    patch,
    path = "/api/churches/{church_id}",
    tag = "Churches",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    request_body = UpdateChurchRequest,
    responses(
        (status = 200, description = "Church renamed", body = ChurchResponse),
        (status = 403, description = "Only the church's admins can rename it", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_church(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateChurchRequest>,
) -> Result<Json<ChurchResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let church = church_service::rename_church(state.db_pool(), &scope, &payload.name).await?;

    Ok(Json(ChurchResponse { church }))
}
