//! Mapping of engine errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use carewatch_core::AlertError;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error class, e.g. `validation` or `not_found`.
    pub kind: &'static str,
}

/// Handler error: wraps [`AlertError`] and picks the status code.
#[derive(Debug)]
pub struct ApiError(pub AlertError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<AlertError> for ApiError {
    fn from(e: AlertError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AlertError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AlertError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
            AlertError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            AlertError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AlertError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "store"),
            AlertError::Timeout { .. } => (StatusCode::SERVICE_UNAVAILABLE, "timeout"),
            AlertError::Serialize(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            warn!(error = %self.0, kind, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                kind,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carewatch_core::AlertStatus;

    fn status(e: AlertError) -> StatusCode {
        ApiError(e).status_and_kind().0
    }

    #[test]
    fn error_classes_map_to_status_codes() {
        assert_eq!(status(AlertError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(AlertError::InvalidTransition {
                from: AlertStatus::Closed,
                to: AlertStatus::New
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(AlertError::not_found("alert", "a1")), StatusCode::NOT_FOUND);
        assert_eq!(status(AlertError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AlertError::Store("down".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(AlertError::Timeout {
                operation: "get_alert",
                timeout_ms: 5
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
