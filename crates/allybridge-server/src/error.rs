use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use allybridge_core::{ErrorCategory, OperationError};

/// API-level errors mapped to HTTP responses.
///
/// Portal operation failures keep their stable error code in the JSON
/// body so callers can react without parsing messages.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Operation(err) => match err.category() {
                ErrorCategory::Validation => StatusCode::BAD_REQUEST,
                // The caller's request was fine; the bridge could not get
                // the portal to cooperate.
                ErrorCategory::Auth
                | ErrorCategory::Session
                | ErrorCategory::Platform
                | ErrorCategory::Decode => StatusCode::BAD_GATEWAY,
                ErrorCategory::Network => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Operation(err) => err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "portal operation failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
