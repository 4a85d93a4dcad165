//! Error responses of the mock chat API.
//!
//! [`ApiError`] implements [`axum::response::IntoResponse`] so handlers can
//! return `Result<…, ApiError>` directly. Bodies follow the backend's
//! `{"detail": ...}` convention.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Failures of the REST endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed `Authorization: Bearer` header.
    #[error("Not authenticated")]
    Unauthorized,

    /// The request body failed validation.
    #[error("{0}")]
    Validation(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };

        tracing::warn!(%status, error = %self, "request rejected");
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
