use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::BridgeError;

/// API error with HTTP status code, rendered as `{"error": "<message>"}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Map a bridge error at the boundary of an operation
    ///
    /// Caller errors are returned as-is with a 400. Everything else is a 500
    /// whose message carries the stage prefix.
    pub fn from_bridge(prefix: &str, err: BridgeError) -> Self {
        if err.is_caller_error() {
            ApiError::bad_request(err.to_string())
        } else {
            ApiError::internal_error(format!("{}: {}", prefix, err))
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
