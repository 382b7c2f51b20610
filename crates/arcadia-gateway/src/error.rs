//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use arcadia_control::ControlError;
use arcadia_core::IdError;
use arcadia_download::DownloadError;
use arcadia_pairing::PairingError;
use arcadia_runtime::RuntimeError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The container engine or sidecar answered with an error.
    #[error("upstream error: {0}")]
    BadGateway(String),

    /// The container engine or sidecar could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An upstream call did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::BadGateway(_) => "bad_gateway",
            Self::Unavailable(_) => "service_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Log an unexpected error and hide its details from the caller.
    fn internal(source: &'static str, err: &impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, source, "Unexpected error");
        Self::Internal(format!("{source} error"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotFound(what) => Self::NotFound(what),
            RuntimeError::Spec(e) => Self::BadRequest(e.to_string()),
            RuntimeError::Engine { .. } => Self::BadGateway(err.to_string()),
            RuntimeError::Connect(msg) => Self::Unavailable(msg),
            RuntimeError::Timeout(operation) => Self::Timeout(operation.to_string()),
            RuntimeError::Config(_) => Self::internal("runtime", &err),
        }
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::SessionNotFound(id) => Self::NotFound(format!("session {id}")),
            ControlError::GameNotFound(id) => Self::NotFound(format!("game {id}")),
            ControlError::SessionExists(_)
            | ControlError::InvalidState { .. }
            | ControlError::InvalidInstallTransition { .. }
            | ControlError::ContainerAlreadyAssigned { .. }
            | ControlError::InstallInProgress(_) => Self::Conflict(err.to_string()),
            ControlError::Spec(e) => Self::BadRequest(e.to_string()),
            ControlError::InvalidRequest(msg) => Self::BadRequest(msg),
            ControlError::LaunchError { .. } => Self::BadGateway(err.to_string()),
            ControlError::Runtime(e) => Self::from(e),
            ControlError::Timeout(operation) => Self::Timeout(operation.to_string()),
            ControlError::Store(e) => Self::internal("storage", &e),
            ControlError::Internal(msg) => Self::internal("orchestrator", &msg),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::NotFound(id) => Self::NotFound(format!("download {id}")),
            DownloadError::InvalidRequest(_) | DownloadError::InvalidFilename(_) => {
                Self::BadRequest(err.to_string())
            }
            DownloadError::Io(e) => Self::internal("filesystem", &e),
            DownloadError::Client(msg) => Self::internal("download client", &msg),
            DownloadError::Store(e) => Self::internal("storage", &e),
        }
    }
}

impl From<PairingError> for ApiError {
    fn from(err: PairingError) -> Self {
        match err {
            PairingError::InvalidPin | PairingError::EmptySecret => {
                Self::BadRequest(err.to_string())
            }
            PairingError::Sidecar(msg) => Self::BadGateway(msg),
            PairingError::Unavailable(msg) => Self::Unavailable(msg),
            PairingError::Client(msg) => Self::internal("sidecar client", &msg),
            PairingError::Store(e) => Self::internal("storage", &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcadia_core::{GameId, SessionId};
    use arcadia_runtime::SpecError;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::NotFound("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("test".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::BadGateway("test".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Timeout("test".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::Internal("test".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_codes() {
        assert_eq!(ApiError::NotFound("x".into()).code(), "not_found");
        assert_eq!(ApiError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(ApiError::Unavailable("x".into()).code(), "service_unavailable");
        assert_eq!(ApiError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn control_errors_map_to_api_errors() {
        let game_id = GameId::new("quake").unwrap();
        assert!(matches!(
            ApiError::from(ControlError::SessionNotFound(SessionId::generate())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(ControlError::InstallInProgress(game_id)),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(ControlError::Spec(SpecError::MissingExecutable)),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(ControlError::Runtime(RuntimeError::Connect("refused".into()))),
            ApiError::Unavailable(_)
        ));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::from(ControlError::Internal("lock poisoned at 0xdead".into()));
        assert!(matches!(&err, ApiError::Internal(msg) if msg == "orchestrator error"));
    }

    #[test]
    fn pairing_errors_map_to_api_errors() {
        assert!(matches!(
            ApiError::from(PairingError::InvalidPin),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(PairingError::Unavailable("refused".into())),
            ApiError::Unavailable(_)
        ));
    }
}
