use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::docker::SessionError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.to_string()),
            ApiError::Session(e) => {
                let (status, code) = match e {
                    SessionError::InvalidPortSpec(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_PORT_SPEC")
                    }
                    SessionError::CreationFailed { .. } => (StatusCode::BAD_GATEWAY, "CREATION_FAILED"),
                    SessionError::StartFailed { .. } => (StatusCode::BAD_GATEWAY, "START_FAILED"),
                    SessionError::InspectFailed { .. } => (StatusCode::BAD_GATEWAY, "INSPECT_FAILED"),
                    SessionError::PortBinding { .. } | SessionError::MalformedBinding { .. } => {
                        (StatusCode::BAD_GATEWAY, "PORT_BINDING_ERROR")
                    }
                    SessionError::NotReady { .. } => (StatusCode::GATEWAY_TIMEOUT, "NOT_READY"),
                    SessionError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
                };
                (status, code, e.to_string())
            }
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            match &self {
                ApiError::Internal(e) => error!("{}: {:#}", code, e),
                _ => error!("{}: {}", code, message),
            }
        }

        let error_response = ErrorResponse {
            error: ErrorDetails {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::ReadinessError;
    use std::time::Duration;

    #[test]
    fn test_session_errors_keep_runtime_message() {
        let err = ApiError::from(SessionError::CreationFailed {
            image: "browser:1.0".to_string(),
            source: anyhow::anyhow!("pull access denied"),
        });
        let (status, code, message) = err.parts();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(code, "CREATION_FAILED");
        assert!(message.contains("browser:1.0"));
        assert!(message.contains("pull access denied"));
    }

    #[test]
    fn test_not_ready_is_gateway_timeout() {
        let err = ApiError::from(SessionError::NotReady {
            url: "http://127.0.0.1:32768/".to_string(),
            source: ReadinessError::Timeout {
                url: "http://127.0.0.1:32768/".to_string(),
                deadline: Duration::from_secs(10),
                attempts: 100,
                last_error: None,
            },
        });
        assert_eq!(err.parts().0, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = ApiError::from(anyhow::anyhow!("secret detail"));
        let (status, _, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("secret"));
    }
}
