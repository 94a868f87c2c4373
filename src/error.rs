use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Error taxonomy surfaced by handlers and repositories.
///
/// Validation and NotFound carry a caller-facing message naming the violated
/// rule. Authentication and Authorization are deliberately generic so a
/// caller cannot distinguish a bad password from an unknown username, or a
/// wrong role from a missing session. Storage wraps backend failures; the
/// cause is logged server-side and never echoed to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid username or password")]
    Authentication,
    #[error("Authentication required")]
    Authorization,
    #[error("{0}")]
    NotFound(String),
    #[error("storage backend unavailable")]
    Storage(anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Authentication => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password".to_string())
            }
            ApiError::Authorization => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Storage(e) => {
                error!(error = %e, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
