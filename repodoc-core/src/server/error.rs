//! JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::Error;

/// An [`Error`] rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

/// HTTP status for an error kind
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Signature(_) | Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::RepoNotFound(_) | Error::DocNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidRequest(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::GitHub { .. } | Error::Llm { .. } => StatusCode::BAD_GATEWAY,
        Error::Database(_) | Error::Io(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        assert_eq!(status_for(&Error::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&Error::Signature("bad".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&Error::RepoNotFound("o/r".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::InvalidRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&Error::github(Some(500), "down")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::Config("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
