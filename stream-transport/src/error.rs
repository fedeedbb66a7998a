//! Error types for the stream transport

use thiserror::Error;

/// Errors that can occur while opening or driving a stream
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network or HTTP communication error
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request could not be turned into a valid HTTP request
    #[error("Invalid stream request: {0}")]
    InvalidRequest(String),

    /// The request could not be signed
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// The stream was closed before the operation completed
    #[error("Transport closed")]
    Closed,
}

/// Convenience type alias for transport results.
pub type Result<T> = std::result::Result<T, TransportError>;
