use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(status = status.as_u16(), error = %self, "error response built");
        let message = match self {
            Self::BadRequest(message) => message,
            Self::NotFound => "not found".to_string(),
            Self::MethodNotAllowed => "method not allowed".to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Fallback for unmatched paths.
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Fallback for known paths hit with an unsupported method.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
