//! Error types for the control client

use thiserror::Error;

/// Errors that can occur during a control request
#[derive(Debug, Error)]
pub enum ControlError {
    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The control endpoint answered with a non-200 status
    #[error("Control request failed: HTTP {0}")]
    Status(u16),

    /// The response body was not the expected JSON
    #[error("JSON parsing error: {0}")]
    Parse(String),

    /// The request could not be signed
    #[error("Request signing failed: {0}")]
    Signing(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
