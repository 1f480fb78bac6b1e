//! Errors of the HTTP façade and how they render as responses.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use cfs_common::error::CfsError;

/// A request that could not be served.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The body was not the expected JSON document.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The body was well-formed but describes an unusable container.
    #[error("{0}")]
    InvalidSpec(String),

    /// No container with the requested id.
    #[error("no container with id {0}")]
    NotFound(String),

    /// The server failed while handling the request.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSpec(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<CfsError> for ApiError {
    fn from(err: CfsError) -> Self {
        match err {
            CfsError::InvalidSpec { .. } => Self::InvalidSpec(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Failure to run the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::BadRequest(String::new()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidSpec(String::new()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_spec_keeps_runtime_message() {
        let err = ApiError::from(CfsError::invalid_spec("image /nope is not accessible"));
        assert!(matches!(err, ApiError::InvalidSpec(_)));
        assert_eq!(
            err.to_string(),
            "invalid container spec: image /nope is not accessible"
        );
    }

    #[test]
    fn other_runtime_errors_are_internal() {
        let err = ApiError::from(CfsError::resource_control_unavailable("no pids"));
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
