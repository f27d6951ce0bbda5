//! Request/response shapes for the thread HTTP API.

use ai_thread_common::ThreadError;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Optional error code
    pub code: Option<String>,

    /// Timestamp of error
    pub timestamp: DateTime<Utc>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: Some(code.to_string()),
            timestamp: Utc::now(),
        }),
    )
}

/// Map the manager's error taxonomy onto HTTP statuses.
pub fn from_thread_error(err: ThreadError) -> ApiError {
    let (status, code) = match &err {
        ThreadError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        ThreadError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
        ThreadError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        ThreadError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ThreadError::NotSupported(_) => (StatusCode::INTERNAL_SERVER_ERROR, "NOT_SUPPORTED"),
        ThreadError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };
    error_response(status, code, err.to_string())
}

/// Body of `POST .../upload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Base64 image payload.
    pub content: String,
    pub mime_type: String,
    pub filename: String,
}

/// Response of `POST .../upload`: the processed image's dimensions.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub filename: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteMessageResponse {
    /// Number of events removed by the truncation.
    pub removed: usize,
}
