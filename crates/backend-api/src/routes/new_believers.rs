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
        models::{
            ConvertRequest, FollowUpRequest, Member, NewBeliever, NewBelieverFilter,
            NewBelieverRequest, NewBelieverResponse, NewBelieversResponse,
        },
    },
    services::new_believers as new_believer_service,
    state::{ChangeAction, ServerEvent},
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ConvertResponse {
    pub new_believer: NewBeliever,
    pub member: Member,
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/new-believers",
    tag = "New believers",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id"), NewBelieverFilter),
    responses(
        (status = 200, description = "New believers, most recent visit first", body = NewBelieversResponse)
    )
)]
pub async fn list_new_believers(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Query(filter): Query<NewBelieverFilter>,
) -> Result<Json<NewBelieversResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let new_believers =
        new_believer_service::list_new_believers(state.db_pool(), &scope, filter).await?;

    Ok(Json(NewBelieversResponse { new_believers }))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/new-believers",
    tag = "New believers",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    request_body = NewBelieverRequest,
    responses(
        (status = 201, description = "New believer recorded", body = NewBelieverResponse),
        (status = 400, description = "Name is required", body = crate::error::ErrorResponse),
        (status = 403, description = "Read-only access", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_new_believer(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<NewBelieverRequest>,
) -> Result<(StatusCode, Json<NewBelieverResponse>), ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let new_believer =
        new_believer_service::create_new_believer(state.db_pool(), &scope, payload).await?;

    Ok((StatusCode::CREATED, Json(NewBelieverResponse { new_believer })))
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/new-believers/{new_believer_id}",
    tag = "New believers",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("new_believer_id" = String, Path, description = "New believer public id")
    ),
    responses(
        (status = 200, description = "New believer details", body = NewBelieverResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_new_believer(
    State(state): State<AppState>,
    Path((church_id, new_believer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<NewBelieverResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let new_believer =
        new_believer_service::get_new_believer(state.db_pool(), &scope, &new_believer_id).await?;

    Ok(Json(NewBelieverResponse { new_believer }))
}

#[utoipa::path(
    patch,
    path = "/api/churches/{church_id}/new-believers/{new_believer_id}",
    tag = "New believers",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("new_believer_id" = String, Path, description = "New believer public id")
    ),
    request_body = NewBelieverRequest,
    responses(
        (status = 200, description = "New believer updated", body = NewBelieverResponse),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_new_believer(
    State(state): State<AppState>,
    Path((church_id, new_believer_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<NewBelieverRequest>,
) -> Result<Json<NewBelieverResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let new_believer = new_believer_service::update_new_believer(
        state.db_pool(),
        &scope,
        &new_believer_id,
        payload,
    )
    .await?;

    Ok(Json(NewBelieverResponse { new_believer }))
}

#[utoipa::path(
    delete,
    path = "/api/churches/{church_id}/new-believers/{new_believer_id}",
    tag = "New believers",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("new_believer_id" = String, Path, description = "New believer public id")
    ),
    responses(
        (status = 204, description = "New believer deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_new_believer(
    State(state): State<AppState>,
    Path((church_id, new_believer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    new_believer_service::delete_new_believer(state.db_pool(), &scope, &new_believer_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/churches/{church_id}/new-believers/{new_believer_id}/follow-up",
    tag = "New believers",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("new_believer_id" = String, Path, description = "New believer public id")
    ),
    request_body = FollowUpRequest,
    responses(
        (status = 200, description = "Follow-up status recorded", body = NewBelieverResponse)
    )
)]
pub async fn set_follow_up(
    State(state): State<AppState>,
    Path((church_id, new_believer_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<FollowUpRequest>,
) -> Result<Json<NewBelieverResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let new_believer = new_believer_service::set_follow_up(
        state.db_pool(),
        &scope,
        &new_believer_id,
        payload.status,
        payload.notes,
    )
    .await?;

    Ok(Json(NewBelieverResponse { new_believer }))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/new-believers/{new_believer_id}/convert",
    tag = "New believers",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("new_believer_id" = String, Path, description = "New believer public id")
    ),
    request_body = ConvertRequest,
    responses(
        (status = 200, description = "New believer converted into a member", body = ConvertResponse),
        (status = 409, description = "Already converted", body = crate::error::ErrorResponse)
    )
)]
pub async fn convert_new_believer(
    State(state): State<AppState>,
    Path((church_id, new_believer_id)): Path<(String, String)>,
    headers: HeaderMap,
    payload: Option<Json<ConvertRequest>>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let (new_believer, member) = new_believer_service::convert_to_member(
        state.db_pool(),
        &scope,
        &new_believer_id,
        payload.bacenta_id,
    )
    .await?;

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

    Ok(Json(ConvertResponse {
        new_believer,
        member,
    }))
}
