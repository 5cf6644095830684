use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::{
        church_scope,
        models::{
            CreateMemberRequest, ImportMembersRequest, ImportMembersResponse,
            LinkedBacentasRequest, MemberActiveRequest, MemberFilter, MemberResponse,
            MembersResponse, UpdateMemberRequest,
        },
    },
    services::members as member_service,
    state::{ChangeAction, ServerEvent},
    ApiError, AppState,
};

async fn announce(state: &AppState, church_id: &str, member_id: &str, action: ChangeAction) {
    state
        .events()
        .to_church(
            church_id,
            ServerEvent::MemberChanged {
                church_id: church_id.to_string(),
                member_id: member_id.to_string(),
                action,
            },
        )
        .await;
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/members",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id"), MemberFilter),
    responses(
        (status = 200, description = "Members matching the filter", body = MembersResponse),
        (status = 403, description = "No access to this church", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Query(filter): Query<MemberFilter>,
) -> Result<Json<MembersResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let members = member_service::list_members(state.db_pool(), &scope, filter).await?;

    Ok(Json(MembersResponse { members }))
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/members",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    request_body = CreateMemberRequest,
    responses(
        (status = 201, description = "Member created", body = MemberResponse),
        (status = 400, description = "Invalid member payload", body = crate::error::ErrorResponse),
        (status = 403, description = "Read-only access", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_member(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let member = member_service::create_member(state.db_pool(), &scope, payload).await?;
    announce(&state, &scope.church_public_id, &member.id, ChangeAction::Created).await;

    Ok((StatusCode::CREATED, Json(MemberResponse { member })))
}

#[utoipa::path(
    get,
    path = "/api/churches/{church_id}/members/{member_id}",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id")
    ),
    responses(
        (status = 200, description = "Member details", body = MemberResponse),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_member(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<MemberResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let member = member_service::get_member(state.db_pool(), &scope, &member_id).await?;

    Ok(Json(MemberResponse { member }))
}

#[utoipa::path(
    patch,
    path = "/api/churches/{church_id}/members/{member_id}",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id")
    ),
    request_body = UpdateMemberRequest,
    responses(
        (status = 200, description = "Member updated; blank strings clear a field", body = MemberResponse),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMemberRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let member =
        member_service::update_member(state.db_pool(), &scope, &member_id, payload).await?;
    announce(&state, &scope.church_public_id, &member.id, ChangeAction::Updated).await;

    Ok(Json(MemberResponse { member }))
}

#[utoipa::path(
    put,
    path = "/api/churches/{church_id}/members/{member_id}/linked-bacentas",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id")
    ),
    request_body = LinkedBacentasRequest,
    responses(
        (status = 200, description = "Linked bacentas replaced", body = MemberResponse),
        (status = 404, description = "Member or bacenta not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn set_linked_bacentas(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<LinkedBacentasRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let member = member_service::set_linked_bacentas(
        state.db_pool(),
        &scope,
        &member_id,
        &payload.bacenta_ids,
    )
    .await?;
    announce(&state, &scope.church_public_id, &member.id, ChangeAction::Updated).await;

    Ok(Json(MemberResponse { member }))
}

#[utoipa::path(
    put,
    path = "/api/churches/{church_id}/members/{member_id}/active",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id")
    ),
    request_body = MemberActiveRequest,
    responses(
        (status = 200, description = "Member activated or deactivated", body = MemberResponse),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn set_member_active(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<MemberActiveRequest>,
) -> Result<Json<MemberResponse>, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    let member =
        member_service::set_member_active(state.db_pool(), &scope, &member_id, payload.active)
            .await?;
    announce(&state, &scope.church_public_id, &member.id, ChangeAction::Updated).await;

    Ok(Json(MemberResponse { member }))
}

#[utoipa::path(
    delete,
    path = "/api/churches/{church_id}/members/{member_id}",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(
        ("church_id" = String, Path, description = "Church public id"),
        ("member_id" = String, Path, description = "Member public id")
    ),
    responses(
        (status = 204, description = "Member deleted"),
        (status = 403, description = "Leaders must file a deletion request", body = crate::error::ErrorResponse),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_member(
    State(state): State<AppState>,
    Path((church_id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let (_, scope) = church_scope(&state, &headers, &church_id).await?;
    member_service::delete_member(state.db_pool(), &scope, &member_id).await?;
    announce(&state, &scope.church_public_id, &member_id, ChangeAction::Deleted).await;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/churches/{church_id}/members/import",
    tag = "Members",
    security(("bearerAuth" = [])),
    params(("church_id" = String, Path, description = "Church public id")),
    request_body = ImportMembersRequest,
    responses(
        (status = 200, description = "Parsed rows, issues and how many members were created", body = ImportMembersResponse),
        (status = 403, description = "Read-only access", body = crate::error::ErrorResponse)
    )
)]
pub async fn import_members(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ImportMembersRequest>,
) -> Result<Json<ImportMembersResponse>, ApiError> {
    let (user, scope) = church_scope(&state, &headers, &church_id).await?;
    let outcome =
        member_service::import_members(state.db_pool(), &scope, &payload.text, payload.dry_run)
            .await?;

    tracing::info!(
        user = %user.public_id,
        church = %scope.church_public_id,
        created = outcome.created,
        skipped = outcome.skipped,
        dry_run = payload.dry_run,
        "member import finished"
    );
    if outcome.created > 0 {
        state
            .events()
            .to_church(
                &scope.church_public_id,
                ServerEvent::MembersImported {
                    church_id: scope.church_public_id.clone(),
                    created: outcome.created,
                },
            )
            .await;
    }

    Ok(Json(outcome))
}
