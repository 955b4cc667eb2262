//! Typed error kinds shared by every component.
//!
//! Replaces the source's exception-based control flow (see DESIGN.md) with a
//! closed set of error kinds that carry a stable, client-safe name across the
//! HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not assigned: {0}")]
    NotAssigned(String),

    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NotFound",
            EngineError::InvalidState(_) => "InvalidState",
            EngineError::NotAssigned(_) => "NotAssigned",
            EngineError::CapacityExhausted(_) => "CapacityExhausted",
            EngineError::UpstreamError(_) => "UpstreamError",
            EngineError::ValidationError(_) => "ValidationError",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::NotAssigned(_) => StatusCode::FORBIDDEN,
            EngineError::CapacityExhausted(_) => StatusCode::CONFLICT,
            EngineError::ValidationError(_) => StatusCode::BAD_REQUEST,
            EngineError::UpstreamError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
    kind: &'static str,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 5xx bodies must stay opaque per the propagation policy; everything
        // else is a 4xx/409 safe to surface verbatim.
        let message = if status.is_server_error() {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            status: "error",
            message,
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}

/// Database failures always roll back and surface as opaque 5xx.
impl From<surrealdb::Error> for EngineError {
    fn from(err: surrealdb::Error) -> Self {
        tracing::error!(error = %err, "database operation failed");
        EngineError::UpstreamError(format!("database error: {err}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
