use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::session::RegistryError;
use crate::sink::SinkError;

/// Structured error type for all API handlers.
///
/// Each variant maps to an HTTP status code, a machine-readable code string,
/// and a human-readable message. Implements [`IntoResponse`] so handlers can
/// return `Result<T, ApiError>` directly.
#[derive(Debug)]
pub enum ApiError {
    /// 404 - Unknown route, or a known route with the wrong method.
    NotFound,
    /// 400 - Request body is not valid JSON.
    InvalidJson(String),
    /// 400 - Body is JSON but has the wrong shape.
    InvalidRequest(String),
    /// 400 - `sessionId` missing or empty on a log append.
    SessionIdRequired,
    /// 400 - `sessionId` present but not a well-formed session id.
    InvalidSessionId(String),
    /// 413 - Body exceeds the configured size limit.
    PayloadTooLarge,
    /// 500 - Creating or appending to a log file failed.
    Storage(String),
    /// 500 - Catch-all internal error.
    InternalError(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error variant.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionIdRequired => StatusCode::BAD_REQUEST,
            ApiError::InvalidSessionId(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a machine-readable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "not_found",
            ApiError::InvalidJson(_) => "invalid_json",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::SessionIdRequired => "session_id_required",
            ApiError::InvalidSessionId(_) => "invalid_session_id",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::Storage(_) => "storage_error",
            ApiError::InternalError(_) => "internal_error",
        }
    }

    /// Returns a human-readable error message.
    pub fn message(&self) -> String {
        match self {
            ApiError::NotFound => "Not found.".to_string(),
            ApiError::InvalidJson(detail) => format!("Invalid JSON: {}.", detail),
            ApiError::InvalidRequest(detail) => format!("Invalid request: {}.", detail),
            ApiError::SessionIdRequired => "sessionId required.".to_string(),
            ApiError::InvalidSessionId(detail) => format!("Invalid sessionId: {}.", detail),
            ApiError::PayloadTooLarge => "Request body is too large.".to_string(),
            ApiError::Storage(detail) => format!("Storage error: {}.", detail),
            ApiError::InternalError(detail) => format!("Internal error: {}.", detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        tracing::error!(error = %e, "session create failed");
        ApiError::Storage(e.to_string())
    }
}

impl From<SinkError> for ApiError {
    fn from(e: SinkError) -> Self {
        tracing::error!(error = %e, "log append failed");
        match &e {
            SinkError::Encode(_) | SinkError::TaskJoin(_) => ApiError::InternalError(e.to_string()),
            SinkError::Write { .. } => ApiError::Storage(e.to_string()),
        }
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::InvalidRequest(rejection.body_text())
        }
    }
}
