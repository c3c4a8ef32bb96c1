//! Error responses
//!
//! Client errors become `400` (`404` for unknown cohorts) carrying the error message.
//! Storage and configuration failures become `500` with a generic message; the detail is
//! only logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use coral_common::Error;
use serde_json::json;
use tracing::error;

/// Handler error wrapping the core error taxonomy
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, message) = if matches!(err, Error::NotFound(_)) {
            (StatusCode::NOT_FOUND, err.to_string())
        } else if err.is_client_error() {
            (StatusCode::BAD_REQUEST, err.to_string())
        } else {
            error!("Request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        };

        let body = Json(json!({
            "error": {
                "code": err.code(),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
