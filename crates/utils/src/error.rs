//! Cross-cutting error taxonomy shared by every core crate.
//!
//! Each crate keeps its own `thiserror` enum for its own concerns
//! (`GitAdapterError`, `ServiceError`, ...) and implements [`Classify`] so the
//! orchestrator and the HTTP boundary can reason about failures uniformly
//! without caring which crate produced them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The error kinds used throughout the core. Not a type hierarchy: every
/// layer returns one of these, and the HTTP boundary maps it to a status
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidArgument,
    /// A compare-and-set lost a race; the caller should treat this as "try
    /// again later", not as a hard failure.
    Busy,
    EngineUnavailable,
    Timeout,
    Canceled,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::Busy => StatusCode::CONFLICT,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Canceled => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Implemented by every crate-local error enum so callers can classify a
/// failure without matching on its concrete variants.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// The error type returned at the HTTP boundary: `{error, request_id}` with
/// the status code implied by `kind`.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn from_classified(err: &impl Classify, message: impl Into<String>) -> Self {
        Self::new(err.kind(), message)
    }
}

impl<E: Classify + std::fmt::Display> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = ?self.kind, request_id = %self.request_id, "request failed: {}", self.message);
        let status = self.kind.status_code();
        let body = ApiErrorBody {
            error: self.message,
            request_id: self.request_id,
        };
        (status, Json(body)).into_response()
    }
}
