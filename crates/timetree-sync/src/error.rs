//! Error type for HTTP handlers.
//!
//! Handlers return [`ApiResult`] and use `?` freely; the error is turned into
//! a JSON body with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared_types::ErrorResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown unit, or a calendar that has not been exported yet
    #[error("{0}")]
    NotFound(String),

    /// Reading a published calendar failed for a reason other than absence
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg.clone())),
            ApiError::Io(e) => {
                tracing::error!("I/O error while serving request: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Internal server error", e.to_string()),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
