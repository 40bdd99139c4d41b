//! Error types for the bridge

use std::net::SocketAddr;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use oci_artifact::OciError;
use serde::Serialize;
use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Why a request was rejected as invalid.
#[derive(Debug, Error)]
pub enum BadRequest {
    /// The body is not a package document.
    #[error("malformed package document: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The request body could not be read.
    #[error("unreadable request body: {0}")]
    Unreadable(#[source] axum::Error),

    /// The package has no versions.
    #[error("no versions")]
    NoVersions,

    /// The package has no attachments.
    #[error("no attachments")]
    NoAttachments,
}

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The request was invalid; nothing was stored.
    #[error(transparent)]
    BadRequest(#[from] BadRequest),

    /// The request body is larger than the configured limit.
    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// No handler for this method and path.
    #[error("not found")]
    NotFound,

    /// The bridge has not been initialised.
    #[error("not initialised")]
    Uninitialized,

    /// The backing registry failed.
    #[error(transparent)]
    Upstream(#[from] OciError),

    /// A document could not be encoded.
    #[error("internal error: {0}")]
    Internal(#[source] serde_json::Error),
}

impl BridgeError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            BridgeError::NotFound => StatusCode::NOT_FOUND,
            BridgeError::Uninitialized
            | BridgeError::Upstream(_)
            | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for the JSON error document.
    ///
    /// Upstream failures have no code; they are reported as plain text.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            BridgeError::BadRequest(_) => Some("BAD_REQUEST"),
            BridgeError::PayloadTooLarge(_) => Some("PAYLOAD_TOO_LARGE"),
            BridgeError::NotFound => Some("NOT_FOUND"),
            BridgeError::Uninitialized => Some("UNINITIALIZED"),
            BridgeError::Internal(_) => Some("INTERNAL"),
            BridgeError::Upstream(_) => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorDocument<'a> {
    message: String,
    code: &'a str,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        match self.error_code() {
            Some(code) => (status, axum::Json(ErrorDocument { message, code })).into_response(),
            None => (
                status,
                [(header::CONTENT_TYPE, mime::TEXT_PLAIN_UTF_8.as_ref())],
                message,
            )
                .into_response(),
        }
    }
}

/// Errors from running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to bind
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Certificates or keys could not be loaded.
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// IO error while serving
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
