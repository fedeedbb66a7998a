//! Error types for the tweetstream crate.

use std::time::Duration;

use control_client::ControlError;
use stream_transport::TransportError;

/// The reconnect budget was spent without re-establishing the stream.
///
/// This is the one fatal condition of a session. It always propagates out of
/// `connect`/`start` and is never routed through a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Failed to reconnect after {retries} tries.")]
pub struct ReconnectError {
    /// The last backoff delay applied before giving up
    pub timeout: Duration,
    /// Reconnect attempts made
    pub retries: u32,
}

/// Errors that can occur while running a stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The transport gave up reconnecting
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),

    /// The stream could not be opened
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A line was not valid JSON; carries the offending text
    #[error("JSON decode error in stream: {0}")]
    Decode(String),

    /// A line decoded to something other than a JSON object
    #[error("Unexpected JSON object in stream: {0}")]
    UnexpectedPayload(String),

    /// A message matched a known kind but its fields had the wrong shape
    #[error("Malformed {kind} message: {reason}")]
    MalformedMessage {
        /// Registry name of the message kind
        kind: String,
        /// What was wrong with it
        reason: String,
    },

    /// A control request failed
    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    /// The blocking runner could not be set up
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl StreamError {
    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::Reconnect(_)
                | StreamError::Transport(_)
                | StreamError::Configuration(_)
                | StreamError::Runtime(_)
        )
    }
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
