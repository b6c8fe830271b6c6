//! Error taxonomy and the HTTP error contract.
//!
//! Service operations return `Result<T, AppError>`. The only place an
//! [`AppError`] becomes a response body is [`map_error`], applied once per
//! request by the boundary middleware in [`crate::server`]. The mapping is a
//! pure function of the error and the [`RunMode`]:
//!
//! ```json
//! { "error": { "code": "NOT_FOUND", "message": "File not found" } }
//! ```
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | `BadRequest` | 400 | `BAD_REQUEST` |
//! | `Unauthorized` | 401 | `UNAUTHORIZED` |
//! | `NotFound` | 404 | `NOT_FOUND` |
//! | `Validation` | 400 | `VALIDATION_ERROR` |
//! | `PayloadTooLarge` | 413 | `PAYLOAD_TOO_LARGE` |
//! | `Upstream` | 502 | `BAD_GATEWAY` |
//! | `Internal` | 500 | `INTERNAL_SERVER_ERROR` |
//!
//! 5xx messages are replaced by the status reason phrase in
//! [`RunMode::Production`]. Source errors are never rendered, only logged.

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::RunMode;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure of a single filesystem operation inside the corpus store.
#[derive(Debug, Error)]
#[error("failed to {op} {}", .path.display())]
pub struct StorageError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl StorageError {
    pub fn new(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

/// Every failure a request can end in.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Reserved for an authentication layer in front of the routes.
    #[error("{0}")]
    Unauthorized(String),

    /// Request did not match the expected shape. Rendered as `"<field> <reason>"`.
    #[error("{field} {reason}")]
    Validation { field: String, reason: String },

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{message}")]
    Upstream {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// `message` is a fixed, path-free description of the failed operation.
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AppError::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn upstream(message: impl Into<String>, source: Option<BoxError>) -> Self {
        AppError::Upstream {
            message: message.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Upstream { .. } => "BAD_GATEWAY",
            AppError::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Joined `Display` of every error in the source chain, for logs only.
    pub fn cause_chain(&self) -> String {
        let mut parts = Vec::new();
        let mut current = self.source();
        while let Some(err) = current {
            parts.push(err.to_string());
            current = err.source();
        }
        parts.join(": ")
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Maps an error to its transport representation.
pub fn map_error(err: &AppError, mode: RunMode) -> (StatusCode, ErrorBody) {
    let status = err.status();
    let message = match err {
        AppError::Internal { .. } | AppError::Upstream { .. } if mode == RunMode::Production => {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        }
        other => other.to_string(),
    };
    (
        status,
        ErrorBody {
            error: ErrorDetail {
                code: err.code().to_string(),
                message,
            },
        },
    )
}

/// Handlers return `AppError` directly. The response carries a
/// production-mode body plus the error itself in its extensions, so the
/// boundary middleware can re-render it with the configured mode and log it.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = map_error(&self, RunMode::Production);
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

/// The error mapping injected once into the router.
#[derive(Debug, Clone, Copy)]
pub struct ErrorMapper {
    mode: RunMode,
}

impl ErrorMapper {
    pub fn new(mode: RunMode) -> Self {
        Self { mode }
    }

    /// Logs the failure once and renders the final response.
    pub fn render(&self, err: &AppError, method: &Method, path: &str) -> Response {
        let (status, body) = map_error(err, self.mode);
        let cause = err.cause_chain();
        if status.is_server_error() {
            error!(
                status = status.as_u16(),
                code = err.code(),
                detail = %err,
                cause = %cause,
                path,
                method = %method,
                "request failed"
            );
        } else {
            warn!(
                status = status.as_u16(),
                code = err.code(),
                detail = %err,
                path,
                method = %method,
                "request rejected"
            );
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, "denied")
    }

    #[test]
    fn client_errors_map_to_their_codes() {
        let cases = [
            (AppError::bad_request("nope"), 400, "BAD_REQUEST"),
            (AppError::not_found("File not found"), 404, "NOT_FOUND"),
            (AppError::Unauthorized("who".into()), 401, "UNAUTHORIZED"),
            (AppError::PayloadTooLarge("big".into()), 413, "PAYLOAD_TOO_LARGE"),
        ];
        for (err, status, code) in cases {
            let (s, body) = map_error(&err, RunMode::Production);
            assert_eq!(s.as_u16(), status);
            assert_eq!(body.error.code, code);
            assert_eq!(body.error.message, err.to_string());
        }
    }

    #[test]
    fn validation_message_is_field_then_reason() {
        let err = AppError::validation("/filename", "must be string");
        let (status, body) = map_error(&err, RunMode::Production);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.code, "VALIDATION_ERROR");
        assert_eq!(body.error.message, "/filename must be string");
    }

    #[test]
    fn internal_message_hidden_in_production() {
        let err = AppError::internal("Failed to list source files", io_err());
        let (status, body) = map_error(&err, RunMode::Production);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "INTERNAL_SERVER_ERROR");
        assert_eq!(body.error.message, "Internal Server Error");
    }

    #[test]
    fn internal_message_shown_in_development_without_source() {
        let err = AppError::internal("Failed to list source files", io_err());
        let (_, body) = map_error(&err, RunMode::Development);
        assert_eq!(body.error.message, "Failed to list source files");
        assert!(!body.error.message.contains("denied"));
    }

    #[test]
    fn cause_chain_walks_sources() {
        let storage = StorageError::new("read directory", "/srv/reading", io_err());
        let err = AppError::internal("Failed to list source files", storage);
        let chain = err.cause_chain();
        assert!(chain.starts_with("failed to read directory /srv/reading"));
        assert!(chain.ends_with("denied"));
    }

    #[test]
    fn into_response_stashes_error_for_the_boundary() {
        let response = AppError::not_found("File not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let stashed = response.extensions().get::<Arc<AppError>>().unwrap();
        assert_eq!(stashed.code(), "NOT_FOUND");
    }
}
