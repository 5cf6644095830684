use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::{
    routes::{
        current_user,
        models::{
            CreateThreadRequest, MessageResponse, MessagesQuery, MessagesResponse,
            PostMessageRequest, ThreadResponse, ThreadsResponse,
        },
    },
    services::chat as chat_service,
    state::{ServerEvent, Topic},
    ApiError, AppState,
};

#[utoipa::path(
    get,
    path = "/api/chat/threads",
    tag = "Chat",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Threads the caller takes part in, most recently active first", body = ThreadsResponse)
    )
)]
pub async fn list_threads(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ThreadsResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let threads = chat_service::list_my_threads(state.db_pool(), &user).await?;

    Ok(Json(ThreadsResponse { threads }))
}

#[utoipa::path(
    post,
    path = "/api/chat/threads",
    tag = "Chat",
    security(("bearerAuth" = [])),
    request_body = CreateThreadRequest,
    responses(
        (status = 201, description = "Thread created", body = ThreadResponse),
        (status = 400, description = "Participants must belong to the caller's church", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ThreadResponse>), ApiError> {
    let user = current_user(&state, &headers).await?;
    let thread = chat_service::create_thread(state.db_pool(), &user, payload).await?;

    Ok((StatusCode::CREATED, Json(ThreadResponse { thread })))
}

#[utoipa::path(
    get,
    path = "/api/chat/threads/{thread_id}",
    tag = "Chat",
    security(("bearerAuth" = [])),
    params(("thread_id" = String, Path, description = "Thread public id")),
    responses(
        (status = 200, description = "Thread with participants and unread count", body = ThreadResponse),
        (status = 403, description = "Caller is not a participant", body = crate::error::ErrorResponse),
        (status = 404, description = "Thread not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ThreadResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let thread = chat_service::get_thread(state.db_pool(), &user, &thread_id).await?;

    Ok(Json(ThreadResponse { thread }))
}

#[utoipa::path(
    get,
    path = "/api/chat/threads/{thread_id}/messages",
    tag = "Chat",
    security(("bearerAuth" = [])),
    params(("thread_id" = String, Path, description = "Thread public id"), MessagesQuery),
    responses(
        (status = 200, description = "A page of messages, oldest first", body = MessagesResponse),
        (status = 403, description = "Caller is not a participant", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let (messages, has_more) =
        chat_service::list_messages(state.db_pool(), &user, &thread_id, query).await?;

    Ok(Json(MessagesResponse { messages, has_more }))
}

#[utoipa::path(
    post,
    path = "/api/chat/threads/{thread_id}/messages",
    tag = "Chat",
    security(("bearerAuth" = [])),
    params(("thread_id" = String, Path, description = "Thread public id")),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message posted", body = MessageResponse),
        (status = 400, description = "Empty or oversized message", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not a participant", body = crate::error::ErrorResponse)
    )
)]
pub async fn post_message(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let user = current_user(&state, &headers).await?;
    let message =
        chat_service::post_message(state.db_pool(), &user, &thread_id, &payload.content).await?;

    state
        .events()
        .publish(
            Topic::Thread(thread_id.clone()),
            ServerEvent::ChatMessage {
                thread_id,
                message: message.clone(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(MessageResponse { message })))
}

#[utoipa::path(
    post,
    path = "/api/chat/threads/{thread_id}/read",
    tag = "Chat",
    security(("bearerAuth" = [])),
    params(("thread_id" = String, Path, description = "Thread public id")),
    responses(
        (status = 204, description = "Thread marked read for the caller"),
        (status = 403, description = "Caller is not a participant", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_thread_read(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = current_user(&state, &headers).await?;
    chat_service::mark_read(state.db_pool(), &user, &thread_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
