//! Error types for Matrixon relations
//!
//! Every fallible operation in the workspace returns [`MatrixonError`]. Client
//! caused failures carry an [`ErrorKind`] which maps onto the Matrix `errcode`
//! sent back to the client; everything else is treated as an internal error.

use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Matrix error codes used by the relations endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// M_UNKNOWN
    Unknown,
    /// M_FORBIDDEN
    Forbidden,
    /// M_MISSING_TOKEN
    MissingToken,
    /// M_UNKNOWN_TOKEN
    UnknownToken,
    /// M_NOT_FOUND
    NotFound,
    /// M_NOT_JSON
    NotJson,
    /// M_BAD_JSON
    BadJson,
    /// M_INVALID_PARAM
    InvalidParam,
}

impl ErrorKind {
    /// The `errcode` string for this kind
    pub fn errcode(&self) -> &'static str {
        match self {
            ErrorKind::Unknown => "M_UNKNOWN",
            ErrorKind::Forbidden => "M_FORBIDDEN",
            ErrorKind::MissingToken => "M_MISSING_TOKEN",
            ErrorKind::UnknownToken => "M_UNKNOWN_TOKEN",
            ErrorKind::NotFound => "M_NOT_FOUND",
            ErrorKind::NotJson => "M_NOT_JSON",
            ErrorKind::BadJson => "M_BAD_JSON",
            ErrorKind::InvalidParam => "M_INVALID_PARAM",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.errcode())
    }
}

/// Matrixon error types
#[derive(Debug, Error)]
pub enum MatrixonError {
    /// Client error with an explicit Matrix error code
    #[error("{1}")]
    BadRequest(ErrorKind, String),

    /// The requester is authenticated but not allowed to do this
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No access token was supplied
    #[error("Missing access token")]
    MissingToken,

    /// The access token is not known to this server
    #[error("Unrecognised access token")]
    UnknownToken,

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database does not have the expected shape
    #[error("Bad database: {0}")]
    BadDatabase(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A room, user or event identifier failed to parse
    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] ruma::IdParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for Matrixon operations
pub type Result<T, E = MatrixonError> = std::result::Result<T, E>;

impl MatrixonError {
    /// Shorthand for a client error
    pub fn bad_request(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::BadRequest(kind, message.into())
    }

    /// Reports corrupt or unexpected rows. Logged immediately because the
    /// client only ever sees a generic message.
    pub fn bad_database(message: &'static str) -> Self {
        error!("❌ BadDatabase: {}", message);
        Self::BadDatabase(message)
    }

    /// The Matrix error code sent to clients
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(kind, _) => *kind,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::MissingToken => ErrorKind::MissingToken,
            Self::UnknownToken => ErrorKind::UnknownToken,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidId(_) => ErrorKind::InvalidParam,
            _ => ErrorKind::Unknown,
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(..) | Self::InvalidId(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MissingToken | Self::UnknownToken => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure was caused by the client
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for MatrixonError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if self.is_client_error() {
            warn!("⚠️ Request rejected ({}): {}", status, self);
            self.to_string()
        } else {
            error!("❌ Request failed: {}", self);
            "Internal server error".to_owned()
        };

        let body = Json(json!({
            "errcode": self.kind().errcode(),
            "error": message,
        }));
        (status, body).into_response()
    }
}
