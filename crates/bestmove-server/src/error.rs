//! Mapping of analysis failures onto HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use engine_orchestrator::AnalysisError;
use serde_json::json;

/// Any failure a handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// The request body was not the JSON we expect.
    #[error("{0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(e) => match e {
                AnalysisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                AnalysisError::Backpressure { .. } | AnalysisError::EngineUnavailable => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                AnalysisError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                AnalysisError::EngineCrash(_) | AnalysisError::ProtocolViolation(_) => {
                    StatusCode::BAD_GATEWAY
                }
                AnalysisError::NoLegalMove => StatusCode::UNPROCESSABLE_ENTITY,
                // Only reachable if the handler itself was dropped.
                AnalysisError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::Analysis(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), status = status.as_u16(), "{message}");
        }

        let body = Json(json!({ "error": self.kind(), "message": message }));
        match self {
            ApiError::Analysis(AnalysisError::Backpressure { .. }) => {
                (status, [(header::RETRY_AFTER, "1")], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AnalysisError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (AnalysisError::Backpressure { capacity: 1 }, StatusCode::SERVICE_UNAVAILABLE),
            (AnalysisError::EngineUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (AnalysisError::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (AnalysisError::EngineCrash("gone".into()), StatusCode::BAD_GATEWAY),
            (AnalysisError::ProtocolViolation("bad".into()), StatusCode::BAD_GATEWAY),
            (AnalysisError::NoLegalMove, StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn test_backpressure_sets_retry_after() {
        let response = ApiError::from(AnalysisError::Backpressure { capacity: 3 }).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_bad_request_kind() {
        let error = ApiError::BadRequest("missing field".into());
        assert_eq!(error.kind(), "invalid_input");
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }
}
