//! Error types and handling for the prompt gateway.
//!
//! [`AppError`] is the HTTP-facing error with a JSON [`IntoResponse`]
//! rendering. [`ProviderError`] covers everything that can go wrong while an
//! adapter drives a backend; it is logged server-side and never rendered to
//! the client verbatim. [`TransportError`] means the client went away.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_POLICY: &str = "policy_violation";
pub const ERROR_TYPE_PERMISSION: &str = "permission_error";
pub const ERROR_TYPE_NOT_FOUND: &str = "not_found_error";

/// Main error type for HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Filesystem errors from the storage endpoints
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client provided invalid data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request refused by a permission flag
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request refused by the content policy
    #[error("Blocked: {0}")]
    Blocked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend failure; the message is deliberately generic
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) | AppError::Blocked(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => ERROR_TYPE_INVALID_REQUEST,
            AppError::Forbidden(_) => ERROR_TYPE_PERMISSION,
            AppError::Blocked(_) => ERROR_TYPE_POLICY,
            AppError::NotFound(_) => ERROR_TYPE_NOT_FOUND,
            _ => ERROR_TYPE_API,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = self.error_type();

        let message = match self {
            AppError::BadRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::Blocked(msg)
            | AppError::NotFound(msg)
            | AppError::BadGateway(msg) => msg,
            other => {
                tracing::error!(error = %other, "Request failed with internal error");
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

/// The client closed the connection; nothing more can be written.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Client closed request")]
pub struct TransportError;

/// Failure while driving a completion backend.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Connection, TLS or body read failure from the reqwest client
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The upstream answered with a non-success status
    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The upstream answered with something we could not decode
    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    /// The provider cannot be used with the current configuration
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProviderError {
    /// True when the failure is the client going away rather than the backend.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::Malformed(e.to_string())
    }
}
