use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::{
        current_user,
        models::{
            BulkUpdateResponse, MarkNotificationReadRequest, NotificationResponse,
            NotificationsQuery, NotificationsResponse, UnreadCountResponse,
        },
    },
    services::notifications as notification_service,
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(NotificationsQuery),
    responses(
        (status = 200, description = "Notifications for the caller, newest first", body = NotificationsResponse)
    )
)]
pub async fn get_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let notifications =
        notification_service::list_notifications(state.db_pool(), user.id, query).await?;

    Ok(Json(NotificationsResponse { notifications }))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Number of unread notifications", body = UnreadCountResponse)
    )
)]
pub async fn get_unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let unread_count = notification_service::unread_count(state.db_pool(), user.id).await?;

    Ok(Json(UnreadCountResponse { unread_count }))
}

#[utoipa::path(
    patch,
    path = "/api/notifications/{notification_id}",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(("notification_id" = String, Path, description = "Notification public id")),
    request_body = MarkNotificationReadRequest,
    responses(
        (status = 200, description = "Read flag updated", body = NotificationResponse),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MarkNotificationReadRequest>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let notification =
        notification_service::mark_read(state.db_pool(), user.id, &notification_id, req.read)
            .await?;

    Ok(Json(NotificationResponse { notification }))
}

#[utoipa::path(
    post,
    path = "/api/notifications/mark-all-read",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Every unread notification marked read", body = BulkUpdateResponse)
    )
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<BulkUpdateResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let updated = notification_service::mark_all_read(state.db_pool(), user.id).await?;

    Ok(Json(BulkUpdateResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{notification_id}",
    tag = "Notifications",
    security(("bearerAuth" = [])),
    params(("notification_id" = String, Path, description = "Notification public id")),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 404, description = "Notification not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = current_user(&state, &headers).await?;
    notification_service::delete_notification(state.db_pool(), user.id, &notification_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
