use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    routes::{
        current_user,
        models::{UpdateProfileRequest, UserProfile, UserSearchQuery, UsersResponse},
    },
    services::users as user_service,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfileResponse {
    pub user: UserProfile,
}

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user profile with church and role", body = UserProfileResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let profile = user_service::get_profile(state.db_pool(), user.id).await?;

    Ok(Json(UserProfileResponse { user: profile }))
}

#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "Users",
    security(("bearerAuth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user profile", body = UserProfileResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let profile = user_service::update_profile(state.db_pool(), user.id, payload).await?;

    Ok(Json(UserProfileResponse { user: profile }))
}

#[utoipa::path(
    get,
    path = "/api/users/search",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(UserSearchQuery),
    responses(
        (status = 200, description = "Users whose email starts with the query", body = UsersResponse),
        (status = 403, description = "Only admins can search", body = crate::error::ErrorResponse)
    )
)]
pub async fn search_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<UsersResponse>, ApiError> {
    let user = current_user(&state, &headers).await?;
    let users = user_service::search_users(state.db_pool(), &user, &query.email).await?;

    Ok(Json(UsersResponse { users }))
}
