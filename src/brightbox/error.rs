//! Error types for the Brightbox backend.

use thiserror::Error;

/// Errors raised by the Brightbox backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BrightboxError {
    /// Raised when the backend is constructed with unusable settings.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Endpoint that was called.
        url: String,
        /// Client error message.
        message: String,
    },
    /// Raised when the API answers with a non-success status. The body is
    /// kept verbatim.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Raised when a success response cannot be decoded.
    #[error("unexpected response from {url}: {message}")]
    Decode {
        /// Endpoint that was called.
        url: String,
        /// Decoder error message.
        message: String,
    },
}
