use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    routes::{
        church_scope,
        models::{CreateGuestRequest, Guest, GuestFilter, GuestResponse, GuestsResponse, Member},
    },
    services::guests as guest_service,
    state::{ChangeAction, ServerEvent},
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct GuestConversionResponse {
    pub guest: Guest,
    pub member: Member,
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/guests",
    tag = "Guests",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id"), GuestFilter),
    responses(
        (status = 200, description = "Guests, newest visit first", body = GuestsResponse)
    )
)]
pub async fn list_guests(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Query(filter): Query<GuestFilter>,
) -> Result<Json<GuestsResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let guests = guest_service::list_guests(state.db_pool(), &scope, filter).await?;

    Ok(Json(GuestsResponse { guests }))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/guests",
    tag = "Guests",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    request_body = CreateGuestRequest,
    responses(
        (status = 201, description = "Guest recorded", body = GuestResponse),
        (status = 400, description = "Invalid guest payload", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_guest(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateGuestRequest>,
) -> Result<(StatusCode, Json<GuestResponse>), ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let guest = guest_service::create_guest(state.db_pool(), &scope, &user, payload).await?;

    Ok((StatusCode::CREATED, Json(GuestResponse { guest })))
}

#[utoipa::path(
    delete,
    path = "/api/churches/{church_id}/guests/{guest_id}",
    tag = "Guests",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("guest_id" = String, Path, description = "Guest public id")
    ),
    responses(
        (status = 204, description = "Guest deleted"),
        (status = 404, description = "Guest not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_guest(
    State(state): State<AppState>,
    Path((church_id, guest_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    guest_service::delete_guest(state.db_pool(), &scope, &guest_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/guests/{guest_id}/convert",
    tag = "Guests",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("guest_id" = String, Path, description = "Guest public id")
    ),
    responses(
        (status = 200, description = "Guest converted into a member", body = GuestConversionResponse),
        (status = 409, description = "Guest already converted", body = crate::error::ErrorResponse)
    )
)]
pub async fn convert_guest(
    State(state): State<AppState>,
    Path((church_id, guest_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<GuestConversionResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let (guest, member) = guest_service::convert_to_member(state.db_pool(), &scope, &guest_id).await?;

    state
        .events()
        .to_church(
            &scope.church_public_id,
            ServerEvent::MemberChanged {
                church_id: scope.church_public_id.clone(),
                member_id: member.id.clone(),
                action: ChangeAction::Created,
            },
        )
        .await;

    Ok(Json(GuestConversionResponse { guest, member }))
}
