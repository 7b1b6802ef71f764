//! Mapping of lifecycle failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use netmap_types::LifecycleError;
use serde::Serialize;

/// Error returned by every handler. Serialized as `{"error": kind, "detail": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad-request"),
            ApiError::Lifecycle(e) => match e {
                LifecycleError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid-device"),
                LifecycleError::InvalidSnapshot(_) => {
                    (StatusCode::BAD_REQUEST, "snapshot-required")
                }
                LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "not-found"),
                LifecycleError::Unauthorized => (StatusCode::FORBIDDEN, "unauthorized"),
                LifecycleError::RestoreFailed(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "restore-failed")
                }
                LifecycleError::Store(_) | LifecycleError::Audit(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let detail = match self {
            ApiError::Lifecycle(LifecycleError::Unauthorized) => None,
            other => Some(other.to_string()),
        };
        (status, Json(ErrorBody { error: kind, detail })).into_response()
    }
}
