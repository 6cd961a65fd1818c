//! Mapping of engine errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use antrian_core::EngineError;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Snake-case error kind, e.g. `channel_busy`.
    pub code: String,
}

/// An engine error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::ChannelClosed { .. }
            | EngineError::ChannelBusy { .. }
            | EngineError::QueueEmpty { .. }
            | EngineError::InvalidState { .. }
            | EngineError::AlreadyExists(_) => StatusCode::CONFLICT,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
