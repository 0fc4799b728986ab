//! Cross-component error taxonomy.
//!
//! Components talk to each other in `anyhow::Result` for ordinary internal
//! propagation, the same as the rest of this crate. [`AppError`] is reserved
//! for the handful of places a caller outside the component needs to branch
//! on *what kind* of failure happened: job results, HTTP responses, and the
//! Validator's diagnosis list. Convert into it at the boundary with
//! [`AppError::internal`] or a more specific constructor.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// The error kinds a caller outside a component may need to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigInvalid,
    DependencyUnavailable,
    DependencyDegraded,
    IndexMissing,
    SourceUnreadable,
    NotFound,
    EmbedderFailed,
    UpsertConflict,
    DeadlineExceeded,
    QueueFull,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind maps to on the wire surface.
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::ConfigInvalid => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::DependencyUnavailable => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::DependencyDegraded => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::IndexMissing => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::SourceUnreadable => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::EmbedderFailed => StatusCode::BAD_GATEWAY,
            ErrorKind::UpsertConflict => StatusCode::CONFLICT,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code_str(self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::DependencyUnavailable => "dependency_unavailable",
            ErrorKind::DependencyDegraded => "dependency_degraded",
            ErrorKind::IndexMissing => "index_missing",
            ErrorKind::SourceUnreadable => "source_unreadable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::EmbedderFailed => "embedder_failed",
            ErrorKind::UpsertConflict => "upsert_conflict",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::Internal => "internal",
        }
    }
}

/// An error carrying a [`ErrorKind`] plus a human-readable message.
///
/// Implements [`IntoResponse`] so handlers in `server.rs` can `?`-propagate
/// it directly; also used as the `error` field on a finished [`crate::models::JobRecord`].
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyUnavailable, message)
    }

    pub fn queue_full(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QueueFull, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn deadline_exceeded(step: &str) -> Self {
        Self::new(
            ErrorKind::DeadlineExceeded,
            format!("deadline exceeded at {step}"),
        )
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error_code: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.kind.status_code();
        let body = ErrorEnvelope {
            error_code: self.kind.code_str(),
            message: &self.message,
        };
        (status, Json(body)).into_response()
    }
}
