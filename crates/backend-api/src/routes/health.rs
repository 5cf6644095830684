use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{services::now, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub timestamp: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service liveness and database reachability", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(state.db_pool()).await {
        Ok(_) => "ok",
        Err(error) => {
            tracing::warn!(%error, "health check could not reach the database");
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        database: database.to_string(),
        timestamp: now(),
    })
}
