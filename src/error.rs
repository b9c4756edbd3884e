//! Error types for relay-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Fetch, Storage)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for relay-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for relay-dl
///
/// Fetch and storage failures never reach a caller directly: the job worker
/// converts them into a terminal `failed` job carrying the error's Display text.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "storage.retention")
        key: Option<String>,
    },

    /// Missing or malformed request input; no state was created
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown or already expired job
    #[error("job not found: {0}")]
    NotFound(String),

    /// Source link rejected by the configured target policy
    #[error("target {target} is not allowed: {reason}")]
    TargetForbidden {
        /// The rejected link or host
        target: String,
        /// Why the policy rejected it
        reason: String,
    },

    /// A job lifecycle event that is illegal in the job's current state
    #[error("cannot apply {event} to job in state {from}")]
    InvalidTransition {
        /// Status the job was in
        from: String,
        /// The event that was attempted
        event: String,
    },

    /// Remote retrieval failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Local write failed
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Errors raised while retrieving a remote resource
#[derive(Debug, Error)]
pub enum FetchError {
    /// Link could not be parsed as a URL
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending link
        url: String,
        /// Parser message
        reason: String,
    },

    /// A forwarded header name or value was not valid HTTP
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name as supplied
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Host name resolution failed
    #[error("could not resolve {host}: {reason}")]
    Resolve {
        /// Host that failed to resolve
        host: String,
        /// Resolver message
        reason: String,
    },

    /// Connection or request failure before a response arrived
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// Requested URL
        url: String,
        /// Transport message
        reason: String,
    },

    /// Remote answered with a non-success status
    #[error("remote returned HTTP {status} for {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Response body stream broke mid-transfer
    #[error("response stream from {url} interrupted: {reason}")]
    Stream {
        /// Requested URL
        url: String,
        /// Transport message
        reason: String,
    },
}

/// Errors raised while persisting fetched bytes
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not create the destination file or its directory
    #[error("failed to create {path}: {reason}")]
    Create {
        /// Path being created
        path: PathBuf,
        /// OS message
        reason: String,
    },

    /// Writing or flushing bytes failed
    #[error("failed to write {path}: {reason}")]
    Write {
        /// Path being written
        path: PathBuf,
        /// OS message
        reason: String,
    },

    /// Moving the finished file into the served directory failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    Finalize {
        /// Partial file location
        source_path: PathBuf,
        /// Served file location
        dest_path: PathBuf,
        /// OS message
        reason: String,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "job not found: 2b1c...",
///     "details": {
///       "job_id": "2b1c..."
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            Error::TargetForbidden { .. } => 403,
            Error::NotFound(_) => 404,
            Error::InvalidTransition { .. } => 409,

            // 500 Internal Server Error - Server-side issues
            Error::Storage(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,

            // 502 Bad Gateway - Remote side failed
            Error::Fetch(_) => 502,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::TargetForbidden { .. } => "target_forbidden",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Fetch(e) => match e {
                FetchError::InvalidUrl { .. } => "invalid_url",
                FetchError::InvalidHeader { .. } => "invalid_header",
                FetchError::Resolve { .. } => "resolve_failed",
                FetchError::Transport { .. } => "fetch_failed",
                FetchError::HttpStatus { .. } => "upstream_status",
                FetchError::Stream { .. } => "stream_interrupted",
            },
            Error::Storage(_) => "storage_error",
            Error::Io(_) => "io_error",
            Error::ShuttingDown => "shutting_down",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::NotFound(id) => Some(serde_json::json!({ "job_id": id })),
            Error::TargetForbidden { target, reason } => Some(serde_json::json!({
                "target": target,
                "reason": reason,
            })),
            Error::InvalidTransition { from, event } => Some(serde_json::json!({
                "current_state": from,
                "event": event,
            })),
            Error::Fetch(FetchError::HttpStatus { url, status }) => Some(serde_json::json!({
                "url": url,
                "upstream_status": status,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
