use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::{
        church_scope,
        models::{CreateDeletionRequest, DeletionRequestResponse, DeletionRequestsResponse},
    },
    services::deletion_requests::{self as deletion_service, Review},
    state::{ChangeAction, ServerEvent},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/deletion-requests",
    tag = "Deletion requests",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    responses(
        (status = 200, description = "All requests for admins, the caller's own otherwise", body = DeletionRequestsResponse)
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeletionRequestsResponse>, ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let requests = deletion_service::list_requests(state.db_pool(), &scope, &user).await?;

    Ok(Json(DeletionRequestsResponse { requests }))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/deletion-requests",
    tag = "Deletion requests",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    request_body = CreateDeletionRequest,
    responses(
        (status = 201, description = "Request filed and admins notified", body = DeletionRequestResponse),
        (status = 409, description = "A request for this member is already pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateDeletionRequest>,
) -> Result<(StatusCode, Json<DeletionRequestResponse>), ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let (request, deliveries) = deletion_service::create_request(
        state.db_pool(),
        &scope,
        &user,
        &payload.member_id,
        payload.reason,
    )
    .await?;
    state.events().deliver(deliveries).await;

    Ok((StatusCode::CREATED, Json(DeletionRequestResponse { request })))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/deletion-requests/{request_id}/approve",
    tag = "Deletion requests",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("request_id" = String, Path, description = "Deletion request public id")
    ),
    responses(
        (status = 200, description = "Request approved and the member deleted", body = DeletionRequestResponse),
        (status = 403, description = "Only admins review requests", body = crate::error::ErrorResponse),
        (status = 409, description = "Request was already reviewed", body = crate::error::ErrorResponse)
    )
)]
pub async fn approve_request(
    State(state): State<AppState>,
    Path((church_id, request_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<DeletionRequestResponse>, ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let review =
        deletion_service::approve_request(state.db_pool(), &scope, &user, &request_id).await?;

    Ok(Json(publish_review(&state, &scope.church_public_id, review).await))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/deletion-requests/{request_id}/reject",
    tag = "Deletion requests",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("request_id" = String, Path, description = "Deletion request public id")
    ),
    responses(
        (status = 200, description = "Request rejected", body = DeletionRequestResponse),
        (status = 409, description = "Request was already reviewed", body = crate::error::ErrorResponse)
    )
)]
pub async fn reject_request(
    State(state): State<AppState>,
    Path((church_id, request_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<DeletionRequestResponse>, ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let review =
        deletion_service::reject_request(state.db_pool(), &scope, &user, &request_id).await?;

    Ok(Json(publish_review(&state, &scope.church_public_id, review).await))
}

async fn publish_review(state: &AppState, church_id: &str, review: Review) -> DeletionRequestResponse {
    if let Some(member_id) = review.deleted_member_id {
        state
            .events()
            .to_church(
                church_id,
                ServerEvent::MemberChanged {
                    church_id: church_id.to_string(),
                    member_id,
                    action: ChangeAction::Deleted,
                },
            )
            .await;
    }
    state.events().deliver(review.deliveries).await;

    DeletionRequestResponse {
        request: review.request,
    }
}
