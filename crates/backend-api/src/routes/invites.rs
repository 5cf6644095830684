use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::{
        current_user,
        models::{InviteResponse, InvitesResponse, SendInviteRequest},
    },
    services::invites::{self as invite_service, InviteOutcome},
    state::ServerEvent,
    ApiError, AppState,
};

/// Push the transition to both parties and tell anyone whose access moved to refetch.
async fn publish(state: &AppState, outcome: InviteOutcome) -> InviteResponse {
    let InviteOutcome {
        invite,
        deliveries,
        access_changed,
        parties,
    } = outcome;

    let events = state.events();
    events.deliver(deliveries).await;
    for user_id in parties {
        events
            .to_user(
                user_id,
                ServerEvent::InviteUpdated {
                    invite: invite.clone(),
                },
            )
            .await;
    }
    for user_id in access_changed {
        events.to_user(user_id, ServerEvent::AccessChanged).await;
    }

    InviteResponse { invite }
}

#[utoipa::path(
    post,
    path = "/api/invites",
    tag = "Invites",
    security(("bearerAuth" = [])),
    request_body = SendInviteRequest,
    responses(
        (status = 201, description = "Invite sent", body = InviteResponse),
        (status = 400, description = "Invalid lifetime or self-invite", body = crate::error::ErrorResponse),
        (status = 403, description = "Only church admins can invite", body = crate::error::ErrorResponse),
        (status = 409, description = "Invite already pending or user already a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SendInviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>), ApiError> {
    let user = current_user(&state, &headers).await?;
    let outcome = invite_service::send_invite_to_user(
        state.db_pool(),
        state.invites(),
        &user,
        &payload.invitee_id,
        payload.expires_in_hours,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(publish(&state, outcome).await)))
}

#[utoipa::path(
    get,
    path = "/api/invites/incoming",
    tag = "Invites",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Invites addressed to the caller", body = InvitesResponse)
    )
)]
pub async fn list_incoming(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InvitesResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let invites = invite_service::list_incoming(state.db_pool(), &user).await?;

    Ok(Json(InvitesResponse { invites }))
}

#[utoipa::path(
    get,
    path = "/api/invites/outgoing",
    tag = "Invites",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Invites sent by the caller", body = InvitesResponse)
    )
)]
pub async fn list_outgoing(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<InvitesResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let invites = invite_service::list_outgoing(state.db_pool(), &user).await?;

    Ok(Json(InvitesResponse { invites }))
}

#[utoipa::path(
    post,
    path = "/api/invites/{invite_id}/accept",
    tag = "Invites",
    security(("bearerAuth" = [])),
    params(("invite_id" = String, Path, description = "Invite public id")),
    responses(
        (status = 200, description = "Invite accepted", body = InviteResponse),
        (status = 403, description = "Invite addressed to someone else", body = crate::error::ErrorResponse),
        (status = 409, description = "Invite is no longer pending", body = crate::error::ErrorResponse),
        (status = 410, description = "Invite expired", body = crate::error::ErrorResponse)
    )
)]
pub async fn accept_invite(
    State(state): State<AppState>,
    Path(invite_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InviteResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let outcome = invite_service::accept_admin_invite(state.db_pool(), &user, &invite_id).await?;

    Ok(Json(publish(&state, outcome).await))
}

#[utoipa::path(
    post,
    path = "/api/invites/{invite_id}/reject",
    tag = "Invites",
    security(("bearerAuth" = [])),
    params(("invite_id" = String, Path, description = "Invite public id")),
    responses(
        (status = 200, description = "Invite declined", body = InviteResponse),
        (status = 409, description = "Invite is no longer pending", body = crate::error::ErrorResponse),
        (status = 410, description = "Invite expired", body = crate::error::ErrorResponse)
    )
)]
pub async fn reject_invite(
    State(state): State<AppState>,
    Path(invite_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InviteResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let outcome = invite_service::reject_admin_invite(state.db_pool(), &user, &invite_id).await?;

    Ok(Json(publish(&state, outcome).await))
}

#[utoipa::path(
    post,
    path = "/api/invites/{invite_id}/cancel",
    tag = "Invites",
    security(("bearerAuth" = [])),
    params(("invite_id" = String, Path, description = "Invite public id")),
    responses(
        (status = 200, description = "Pending invite withdrawn", body = InviteResponse),
        (status = 403, description = "Only the inviter can cancel", body = crate::error::ErrorResponse),
        (status = 409, description = "Invite is no longer pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_invite(
    State(state): State<AppState>,
    Path(invite_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InviteResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let outcome = invite_service::cancel_invite(state.db_pool(), &user, &invite_id).await?;

    Ok(Json(publish(&state, outcome).await))
}

#[utoipa::path(
    post,
    path = "/api/invites/{invite_id}/remove-access",
    tag = "Invites",
    security(("bearerAuth" = [])),
    params(("invite_id" = String, Path, description = "Invite public id")),
    responses(
        (status = 200, description = "Access granted by the invite removed", body = InviteResponse),
        (status = 403, description = "Only the inviter can remove access", body = crate::error::ErrorResponse),
        (status = 409, description = "Invite was never accepted", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_access(
    State(state): State<AppState>,
    Path(invite_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<InviteResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let outcome = invite_service::remove_leader_access(state.db_pool(), &user, &invite_id).await?;

    Ok(Json(publish(&state, outcome).await))
}
