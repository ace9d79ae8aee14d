use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use workforce_core::WorkforceError;

/// An error returned from a REST handler, rendered as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkforceError> for ApiError {
    fn from(err: WorkforceError) -> Self {
        let message = err.to_string();
        match err {
            WorkforceError::NotFound(_) => Self::NotFound(message),
            WorkforceError::InvalidTransition { .. } | WorkforceError::Graph(_) => {
                Self::Conflict(message)
            }
            WorkforceError::BudgetExceeded(_) => Self::ServiceUnavailable(message),
            WorkforceError::Config(_)
            | WorkforceError::Decomposition(_)
            | WorkforceError::Json(_) => Self::BadRequest(message),
            _ => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        // Internal details stay in the log.
        let error = match self {
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        let payload = ErrorPayload { error };
        (status, Json(payload)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_internal_error_body_is_generic() {
        let err = ApiError::from(WorkforceError::Store(
            "Failed to write /var/lib/workforce/store/task/1.json".into(),
        ));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn test_client_error_body_keeps_message() {
        let (status, body) = body_of(ApiError::NotFound("Goal 42".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not found: Goal 42");
    }

    #[test]
    fn test_engine_errors_map_to_status_codes() {
        let cases = [
            (WorkforceError::NotFound("Goal x".into()), StatusCode::NOT_FOUND),
            (
                WorkforceError::invalid_transition("goal", Uuid::nil(), "failed", "paused"),
                StatusCode::CONFLICT,
            ),
            (
                WorkforceError::BudgetExceeded("spent".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (WorkforceError::Config("bad".into()), StatusCode::BAD_REQUEST),
            (
                WorkforceError::Store("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
