//! Transport events, the opened-stream handle, and the `Transport` seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::request::StreamRequest;

/// Everything a stream reports to its consumer, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The server accepted the request and the body is being read
    Connected,
    /// One non-empty line of the response body
    Line(String),
    /// A non-fatal transport problem
    Error(String),
    /// HTTP 401, commonly caused by clock drift
    Unauthorized,
    /// HTTP 420 or 429 rate limiting
    EnhanceYourCalm,
    /// A reconnect is scheduled after `timeout`; `retries` counts attempts so far
    Reconnect { timeout: Duration, retries: u32 },
    /// Nothing arrived within the stall window; the connection stays open
    NoDataReceived,
    /// The reconnect budget is spent and the stream has ended
    MaxReconnects { timeout: Duration, retries: u32 },
}

/// Ends an opened stream. Cloneable and idempotent.
#[derive(Debug, Clone)]
pub struct TransportCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl TransportCloser {
    /// Create a closer and the receiver a worker watches
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolves once `close()` was called or every closer was dropped.
pub(crate) async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// The consuming end of one opened stream.
///
/// Dropping the stream closes it.
#[derive(Debug)]
pub struct TransportStream {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    closer: TransportCloser,
}

impl TransportStream {
    pub fn new(events: mpsc::UnboundedReceiver<TransportEvent>, closer: TransportCloser) -> Self {
        Self { events, closer }
    }

    /// Next event, or `None` once the stream has ended
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    pub fn closer(&self) -> TransportCloser {
        self.closer.clone()
    }

    pub fn close(&self) {
        self.closer.close();
    }
}

impl Drop for TransportStream {
    fn drop(&mut self) {
        self.closer.close();
    }
}

/// Opens line streams. The production implementation is [`crate::HttpTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: StreamRequest) -> Result<TransportStream>;
}
