//! Error types for the report service.
//!
//! This module defines the central `Error` enum shared by the coordinator,
//! the report store, the renderer and the HTTP layer. It implements
//! [`IntoResponse`] so handlers can return `Result<_, Error>` directly; the
//! response carries a `{code, message}` JSON body and a matching status.
//!
//! ## Error Cases
//! - `InvalidRequest`: malformed identifier, date, or report kind (400).
//! - `NotFound`: no generated file yet, or the entity is absent from the
//!   system of record (404).
//! - `Saturated` / `ServiceShutdown`: the render pool cannot take more work
//!   (503).
//! - `Storage`, `Render`, `ChannelError`: internal failures (500).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the report service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// The client request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The requested report file or entity does not exist.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Reading or writing the report directory failed.
    #[error("Storage error: {context}")]
    Storage { context: String },

    /// Spreadsheet serialization failed.
    #[error("Render error: {context}")]
    Render { context: String },

    /// Internal channel send/receive failure between tasks or workers.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Every render worker queue is full.
    #[error("Render queue is full, retry later")]
    Saturated,

    /// A render was dispatched while the service was shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

/// Coarse error classes exposed to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Unavailable,
    Internal,
}

/// JSON body of every error response.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn storage(context: impl Into<String>) -> Self {
        Self::Storage {
            context: context.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest { .. } => ErrorCode::Validation,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Saturated | Self::ServiceShutdown => ErrorCode::Unavailable,
            Self::Storage { .. }
            | Self::Render { .. }
            | Self::ChannelError { .. } => ErrorCode::Internal,
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
