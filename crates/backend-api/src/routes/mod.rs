pub mod analytics;
pub mod attendance;
pub mod auth;
pub mod bacentas;
pub mod chat;
pub mod churches;
pub mod deletion_requests;
pub mod guests;
pub mod head_counts;
pub mod health;
pub mod invites;
pub mod members;
pub mod models;
pub mod new_believers;
pub mod notifications;
pub mod users;
pub mod websocket;

use axum::http::HeaderMap;
use flock_auth::User;

use crate::permissions::TenantScope;
use crate::services::tenancy::resolve_scope;
use crate::{util::require_bearer, ApiError, AppState};

/// Authenticate the bearer token of a request.
pub(crate) async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = require_bearer(headers)?;
    let (user, _) = state.authenticate(&token).await?;
    Ok(user)
}

/// Authenticate and resolve the church a church-scoped route targets.
pub(crate) async fn church_scope(
    state: &AppState,
    headers: &HeaderMap,
    church_id: &str,
) -> Result<(User, TenantScope), ApiError> {
    let user = current_user(state, headers).await?;
    let scope = resolve_scope(state.db_pool(), &user, church_id).await?;
    Ok((user, scope))
}
