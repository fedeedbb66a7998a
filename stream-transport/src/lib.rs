//! Generic long-lived HTTP line-stream transport.
//!
//! This crate opens a persistent HTTP connection, splits the response body into
//! newline-delimited lines, and reports everything that happens on the wire as a
//! sequence of [`TransportEvent`]s. It has no knowledge of the message format
//! carried by the lines.
//!
//! # Overview
//!
//! - [`StreamRequest`]: method, endpoint, parameters, user agent, credentials and
//!   proxy for one streaming connection.
//! - [`Transport`]: the seam consumers open streams through. [`HttpTransport`] is
//!   the production implementation.
//! - [`TransportStream`]: the receiving end of one opened stream, plus a
//!   [`TransportCloser`] that can end it from anywhere.
//! - [`ReconnectPolicy`]: backoff schedule applied between reconnect attempts.
//!
//! # Lifecycle
//!
//! The HTTP worker connects, emits [`TransportEvent::Connected`], then one
//! [`TransportEvent::Line`] per non-empty line. Disconnects and HTTP failures are
//! reported and followed by [`TransportEvent::Reconnect`] and a backoff delay.
//! Once the attempt budget is spent the worker emits
//! [`TransportEvent::MaxReconnects`] and the stream ends.
//!
//! ```no_run
//! use stream_transport::{HttpMethod, HttpTransport, StreamRequest, Transport, TransportEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stream_transport::TransportError> {
//!     let request = StreamRequest::new(HttpMethod::Get, "https://stream.example.com", "/1.1/statuses/sample.json");
//!     let mut stream = HttpTransport::new().open(request).await?;
//!
//!     while let Some(event) = stream.next().await {
//!         if let TransportEvent::Line(line) = event {
//!             println!("{line}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod event;
mod framing;
mod http;
mod policy;
mod request;
#[cfg(any(test, feature = "test-support"))]
mod scripted;

pub use error::{Result, TransportError};
pub use event::{Transport, TransportCloser, TransportEvent, TransportStream};
pub use framing::{LineBuffer, DEFAULT_MAX_LINE_LEN};
pub use http::HttpTransport;
pub use policy::{Backoff, Exhausted, FailureKind, ReconnectPolicy, ReconnectState};
pub use request::{
    authorize, BasicCredentials, Credentials, HttpMethod, OAuthCredentials, RequestSigner,
    SignableRequest, StaticAuthorization, StreamRequest,
};
#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedTransport;
