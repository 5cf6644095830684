use axum::http::StatusCode;
use flock_auth::AuthError;
use thiserror::Error;

use crate::ApiError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Gone(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn gone(msg: impl Into<String>) -> Self {
        Self::Gone(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::BadRequest(msg) => ApiError::bad_request(msg),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::Gone(msg) => ApiError::new(StatusCode::GONE, msg),
            ServiceError::Database(db_err) => {
                tracing::error!("Database error: {}", db_err);
                ApiError::internal_server_error("Database operation failed")
            }
            ServiceError::Auth(auth_err) => ApiError::from(auth_err),
            ServiceError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ServiceError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ApiError::internal_server_error(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_keep_their_messages() {
        let api: ApiError = ServiceError::conflict("invite already pending").into();
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.message, "invite already pending");

        let api: ApiError = ServiceError::gone("invite expired").into();
        assert_eq!(api.status, StatusCode::GONE);
    }

    #[test]
    fn database_errors_are_masked() {
        let api: ApiError = ServiceError::Database(sqlx::Error::RowNotFound).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "Database operation failed");
    }
}
