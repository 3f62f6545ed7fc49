//! API error types for the Shortcut client.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the Shortcut API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The local rate limiter could not grant a permit within its maximum delay.
    #[error("Rate limit exceeded for bucket '{bucket}': a permit would need a {wait:?} wait")]
    RateLimitExceeded {
        /// The bucket that ran out of permits.
        bucket: String,
        /// How long the caller would have had to wait.
        wait: Duration,
    },

    /// Non-2xx HTTP status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// The response status.
        status: StatusCode,
        /// The requested URL.
        url: String,
        /// The response body text, possibly empty.
        body: String,
    },

    /// Network or HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Local IO error, e.g. while reading a file to upload.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid header value (usually a malformed token).
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// The response body was not what we expected.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Keyring error when storing/retrieving tokens.
    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Build a status error from the parts of a failed response.
    pub fn from_status(status: StatusCode, url: &str, body: &str) -> Self {
        ApiError::Status {
            status,
            url: url.to_string(),
            body: body.to_string(),
        }
    }

    /// The HTTP status, if this error came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Whether this is a transport-level failure (connection, timeout, local IO).
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Io(_))
    }
}
