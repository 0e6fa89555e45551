use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Error kinds a client can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    RequestDenied,
    InternalError,
}

/// Error body returned by every GNAP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorCode,
}

/// The three client-visible failure classes.
///
/// The detail strings are logged, never sent: a client only ever sees the
/// error code. `RequestDenied` in particular must not tell a missing grant
/// apart from a grant that is not ready yet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GnapError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request denied: {0}")]
    RequestDenied(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl GnapError {
    pub fn invalid_request<S: ToString>(detail: S) -> Self {
        Self::InvalidRequest(detail.to_string())
    }

    pub fn denied<S: ToString>(detail: S) -> Self {
        Self::RequestDenied(detail.to_string())
    }

    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::Internal(detail.to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::RequestDenied(_) => ErrorCode::RequestDenied,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RequestDenied(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<crate::store::StoreError> for GnapError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for GnapError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            Self::Internal(detail) => log::error!("GNAP request failed: {detail}"),
            Self::RequestDenied(detail) => log::warn!("GNAP request denied: {detail}"),
            Self::InvalidRequest(detail) => log::debug!("Invalid GNAP request: {detail}"),
        }
        let body = ErrorResponse { error: self.code() };
        (self.status_code(), Json(body)).into_response()
    }
}
