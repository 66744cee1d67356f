//! Error types for DSS API operations.

use thiserror::Error;

/// Errors that can occur while talking to a DSS instance or loading its config.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Configuration is missing or unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The request never produced an HTTP response.
    #[error("Transport error for {url}: {message}")]
    Transport {
        /// Request URL.
        url: String,
        /// Transport failure description.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("Unexpected status {status} from {url}: {body}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// The server answered with something other than JSON.
    #[error("Expected a JSON response from {url} but got '{content_type}' instead")]
    UnexpectedContentType {
        /// Request URL.
        url: String,
        /// Content type reported by the server.
        content_type: String,
    },

    /// A resource does not exist on the remote side.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
