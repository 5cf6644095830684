use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::{
        church_scope,
        models::{BacentaRequest, BacentaResponse, BacentasResponse},
    },
    services::bacentas as bacenta_service,
    state::{ChangeAction, ServerEvent},
    ApiError, AppState,
};

async fn announce(state: &AppState, church_id: &str, bacenta_id: &str, action: ChangeAction) {
    state
        .events()
        .to_church(
            church_id,
            ServerEvent::BacentaChanged {
                church_id: church_id.to_string(),
                bacenta_id: bacenta_id.to_string(),
                action,
            },
        )
        .await;
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/bacentas",
    tag = "Bacentas",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    responses(
        (status = 200, description = "Bacentas with member counts", body = BacentasResponse),
        (status = 403, description = "No access to this church", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_bacentas(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<BacentasResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let bacentas = bacenta_service::list_bacentas(state.db_pool(), &scope).await?;

    Ok(Json(BacentasResponse { bacentas }))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/bacentas",
    tag = "Bacentas",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    request_body = BacentaRequest,
    responses(
        (status = 201, description = "Bacenta created", body = BacentaResponse),
        (status = 403, description = "Only admins manage bacentas", body = crate::error::ErrorResponse),
        (status = 409, description = "A bacenta with that name exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_bacenta(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<BacentaRequest>,
) -> Result<(StatusCode, Json<BacentaResponse>), ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let bacenta = bacenta_service::create_bacenta(state.db_pool(), &scope, &payload.name).await?;
    announce(&state, &church_id, &bacenta.public_id, ChangeAction::Created).await;

    Ok((StatusCode::CREATED, Json(BacentaResponse { bacenta })))
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/bacentas/{bacenta_id}",
    tag = "Bacentas",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("bacenta_id" = String, Path, description = "Bacenta public id")
    ),
    responses(
        (status = 200, description = "Bacenta details", body = BacentaResponse),
        (status = 404, description = "Bacenta not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_bacenta(
    State(state): State<AppState>,
    Path((church_id, bacenta_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<BacentaResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let bacenta = bacenta_service::get_bacenta(state.db_pool(), &scope, &bacenta_id).await?;

    Ok(Json(BacentaResponse { bacenta }))
}

#[utoipa::path(
    patch,
    path = "/api/churches/{church_id}/bacentas/{bacenta_id}",
    tag = "Bacentas",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("bacenta_id" = String, Path, description = "Bacenta public id")
    ),
    request_body = BacentaRequest,
    responses(
        (status = 200, description = "Bacenta renamed", body = BacentaResponse),
        (status = 409, description = "A bacenta with that name exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn rename_bacenta(
    State(state): State<AppState>,
    Path((church_id, bacenta_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<BacentaRequest>,
) -> Result<Json<BacentaResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let bacenta =
        bacenta_service::rename_bacenta(state.db_pool(), &scope, &bacenta_id, &payload.name)
            .await?;
    announce(&state, &church_id, &bacenta.public_id, ChangeAction::Updated).await;

    Ok(Json(BacentaResponse { bacenta }))
}

#[utoipa::path(
    delete,
    path = "/api/churches/{church_id}/bacentas/{bacenta_id}",
    tag = "Bacentas",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("bacenta_id" = String, Path, description = "Bacenta public id")
    ),
    responses(
        (status = 204, description = "Bacenta deleted; its members become unassigned"),
        (status = 404, description = "Bacenta not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_bacenta(
    State(state): State<AppState>,
    Path((church_id, bacenta_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    bacenta_service::delete_bacenta(state.db_pool(), &scope, &bacenta_id).await?;
    announce(&state, &church_id, &bacenta_id, ChangeAction::Deleted).await;

    Ok(StatusCode::NO_CONTENT)
}
