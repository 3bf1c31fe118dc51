// crates/lnt-server/src/error.rs
// ============================================================================
// Module: LNT Server Errors
// Description: Application and HTTP-facing error types.
// Purpose: Turn handler failures into HTML pages or JSON envelopes.
// Dependencies: axum, serde, thiserror
// ============================================================================

//! ## Overview
//! [`AppError`] covers application setup: configuration, templates, logging
//! and transport. [`ServerError`] is what request handlers return; page
//! handlers render it as a small HTML document while the REST API wraps it in
//! [`ApiError`] to produce `{"error": {"code", "message"}}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::extract::rejection::PathRejection;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use lnt_db::DbError;
use minijinja::HtmlEscape;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Application Errors
// ============================================================================

/// Errors raised while building or running the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration or instance loading failed.
    #[error("config error: {0}")]
    Config(String),
    /// Template environment setup failed.
    #[error("template error: {0}")]
    Template(String),
    /// Logging setup failed.
    #[error("logging error: {0}")]
    Logging(String),
    /// Socket or server failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// An operation needed configuration that was never loaded.
    #[error("application configuration has not been loaded")]
    NotConfigured,
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        Self::Template(err.to_string())
    }
}

// ============================================================================
// SECTION: Request Errors
// ============================================================================

/// Error returned by request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// HTTP status to respond with.
    status: StatusCode,
    /// Message shown to the client.
    message: String,
}

impl ServerError {
    /// Builds an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 500 Internal Server Error. The detail is logged, not returned.
    #[must_use]
    pub fn internal(detail: &str) -> Self {
        tracing::error!(error = detail, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    /// Returns the response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<DbError> for ServerError {
    fn from(err: DbError) -> Self {
        Self::internal(&err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let reason = self.status.canonical_reason().unwrap_or("Error");
        let body = format!(
            "<!doctype html>\n<html><head><title>{code} {reason}</title></head>\
             <body><h1>{reason}</h1><p>{message}</p></body></html>\n",
            code = self.status.as_u16(),
            message = HtmlEscape(&self.message),
        );
        (self.status, Html(body)).into_response()
    }
}

// ============================================================================
// SECTION: API Errors
// ============================================================================

/// JSON error envelope returned by the REST API.
#[derive(Debug)]
pub struct ApiError(ServerError);

/// Top-level JSON error document.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    /// Error body.
    error: ErrorBody,
}

/// Error code and message.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Machine-readable code derived from the status.
    code: &'static str,
    /// Human-readable message.
    message: String,
}

impl ApiError {
    /// Returns the wrapped error.
    #[must_use]
    pub const fn inner(&self) -> &ServerError {
        &self.0
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self(ServerError::from(err))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(ServerError::new(rejection.status(), rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ServerError {
            status,
            message,
        } = self.0;
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: status_code_label(status),
                message,
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Maps a status to its envelope code.
fn status_code_label(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::CONFLICT => "conflict",
        StatusCode::INTERNAL_SERVER_ERROR => "internal_error",
        _ => status.canonical_reason().unwrap_or("error"),
    }
}
