use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use flock_auth::{AuthSession, NewAccount, User, UserRole};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    services::{auth as auth_service, timestamp},
    util::require_bearer,
    ApiError, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct GoogleLoginResponse {
    pub authorize_url: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GoogleLoginQuery {
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GoogleCallbackRequest {
    pub code: String,
    pub state: String,
    pub redirect_uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    /// Name of the church created for the new admin.
    pub church_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserResponse,
    pub expires_at: String,
}

impl SessionResponse {
    pub fn new(session: AuthSession, user: User) -> Self {
        Self {
            token: session.token,
            user: user.into(),
            expires_at: timestamp(session.expires_at),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[schema(value_type = String, example = "admin")]
    pub role: UserRole,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        Self {
            id: value.public_id,
            email: value.email,
            display_name: value.display_name,
            role: value.role,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account and church created", body = SessionResponse),
        (status = 400, description = "Invalid registration payload", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let account = NewAccount {
        display_name: payload.display_name.as_deref(),
        church_name: payload.church_name.as_deref(),
    };
    let (session, user) = auth_service::register(
        state.authenticator(),
        &payload.email,
        &payload.password,
        account,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(SessionResponse::new(session, user))))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (session, user) =
        auth_service::login(state.authenticator(), &payload.email, &payload.password).await?;

    Ok(Json(SessionResponse::new(session, user)))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = require_bearer(&headers)?;
    state.authenticator().logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/auth/google/login",
    tag = "Auth",
    params(GoogleLoginQuery),
    responses(
        (status = 200, description = "Google OAuth authorization URL", body = GoogleLoginResponse),
        (status = 503, description = "Google OAuth not configured", body = crate::error::ErrorResponse)
    )
)]
pub async fn google_login(
    State(state): State<AppState>,
    Query(params): Query<GoogleLoginQuery>,
) -> Result<Json<GoogleLoginResponse>, ApiError> {
    let authorize_url = auth_service::google_login_url(
        state.authenticator(),
        state.oauth_state(),
        params.redirect_uri,
    )
    .await?;

    Ok(Json(GoogleLoginResponse { authorize_url }))
}

#[utoipa::path(
    post,
    path = "/api/auth/google/callback",
    tag = "Auth",
    request_body = GoogleCallbackRequest,
    responses(
        (status = 200, description = "Google OAuth callback succeeded", body = SessionResponse),
        (status = 400, description = "Invalid OAuth payload", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication failed", body = crate::error::ErrorResponse),
        (status = 503, description = "Google OAuth not configured", body = crate::error::ErrorResponse)
    )
)]
pub async fn google_callback(
    State(state): State<AppState>,
    Json(payload): Json<GoogleCallbackRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let (session, user) = auth_service::google_callback(
        state.authenticator(),
        state.oauth_state(),
        payload.code,
        payload.state,
        payload.redirect_uri,
    )
    .await?;

    Ok(Json(SessionResponse::new(session, user)))
}
