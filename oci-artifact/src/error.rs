//! Error types for OCI operations

use std::fmt;

use http::{Method, StatusCode};
use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for OCI operations
pub type OciResult<T> = Result<T, OciError>;

/// Errors returned while pushing, fetching or copying OCI content.
#[derive(Debug, Error)]
pub enum OciError {
    /// A tag, manifest or blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A repository reference could not be parsed.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// A digest string could not be parsed.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Content does not hash to its descriptor's digest.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest named by the descriptor
        expected: String,
        /// Digest of the content received
        actual: String,
    },

    /// Content length differs from its descriptor's size.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size named by the descriptor
        expected: u64,
        /// Size of the content received
        actual: u64,
    },

    /// The content has a media type this crate cannot handle here.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A manifest could not be encoded or decoded.
    #[error("invalid manifest: {0}")]
    InvalidManifest(#[source] serde_json::Error),

    /// The HTTP request could not be sent.
    #[error("request failed: {0}")]
    Request(#[source] hyperdriver::client::Error),

    /// The response body could not be read.
    #[error("error reading response body: {0}")]
    Body(#[source] BoxError),

    /// The registry answered with an error status.
    #[error(transparent)]
    Response(#[from] HttpResponseError),

    /// Authentication with the registry failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An HTTP request could not be built.
    #[error("invalid request: {0}")]
    Http(#[from] http::Error),
}

impl OciError {
    /// True if the error means the requested content does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            OciError::NotFound(_) => true,
            OciError::Response(response) => response.status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }
}

/// A registry returned an error response
#[derive(Debug, Clone)]
pub struct HttpResponseError {
    /// Method of the failed request
    pub method: Method,

    /// URL of the failed request
    pub url: String,

    /// The HTTP status code of the response
    pub status: StatusCode,

    /// The message body of the response
    pub message: String,
}

impl fmt::Display for HttpResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}: HTTP {} response: {}",
            self.method, self.url, self.status, self.message
        )
    }
}

impl std::error::Error for HttpResponseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_http_404() {
        let err: OciError = HttpResponseError {
            method: Method::GET,
            url: "http://localhost/v2/pkg/manifests/latest".into(),
            status: StatusCode::NOT_FOUND,
            message: "manifest unknown".into(),
        }
        .into();

        assert!(err.is_not_found());
        assert!(OciError::NotFound("pkg:latest".into()).is_not_found());
        assert!(!OciError::Unauthorized("nope".into()).is_not_found());
    }
}
