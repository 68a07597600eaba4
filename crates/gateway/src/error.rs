//! Maps `agentrun_domain::Error` onto HTTP responses per the taxonomy
//! in spec §7. Grounded on `gateway/src/api/router.rs`'s `api_error`
//! helper (`(StatusCode, Json(json!({"error": message}))).into_response()`);
//! wrapped in a newtype since neither `axum::IntoResponse` nor
//! `agentrun_domain::Error` live in this crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use agentrun_domain::error::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            Error::ThreadAlreadyRunning(_) => (StatusCode::CONFLICT, self.0.to_string()),
            Error::InvalidInput(_) | Error::InvalidScope(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            Error::MiddlewareTimeout(_) => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            Error::Storage(_) | Error::Io(_) | Error::Json(_) => {
                tracing::error!(error = %self.0, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal storage error".to_string(),
                )
            }
            // Agent failures are encoded in-stream as RUN_ERROR, never
            // surfaced as an HTTP error status; reaching here would
            // only happen if something called this on the wrong path.
            Error::AgentFailure(_) => {
                tracing::error!(error = %self.0, "agent failure reached the HTTP error mapper");
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
            }
        };
        api_error(status, message)
    }
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

pub fn not_found() -> Response {
    api_error(StatusCode::NOT_FOUND, "Not found")
}
