//! In-memory transport for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::event::{Transport, TransportCloser, TransportEvent, TransportStream};
use crate::request::StreamRequest;

#[derive(Default)]
struct ScriptedInner {
    pending: VecDeque<mpsc::UnboundedReceiver<TransportEvent>>,
    opened: Vec<StreamRequest>,
    closers: Vec<TransportCloser>,
}

/// A transport whose streams are scripted by the test.
///
/// Each `open` consumes the next queued script. A script pushed with
/// [`push_events`](Self::push_events) ends after its last event; one pushed
/// with [`push_live`](Self::push_live) stays open until the returned sender is
/// dropped. Opening with nothing queued yields a stream that ends immediately.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<ScriptedInner>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream that delivers `events` and then ends
    pub fn push_events(&self, events: impl IntoIterator<Item = TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in events {
            let _ = tx.send(event);
        }
        self.inner.lock().pending.push_back(rx);
    }

    /// Queue a stream fed through the returned sender
    pub fn push_live(&self) -> mpsc::UnboundedSender<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().pending.push_back(rx);
        tx
    }

    /// Every request passed to `open`, in order
    pub fn opened_requests(&self) -> Vec<StreamRequest> {
        self.inner.lock().opened.clone()
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        self.inner.lock().opened.last().cloned()
    }

    /// Whether the stream returned by the `index`-th `open` has been closed
    pub fn was_closed(&self, index: usize) -> bool {
        self.inner
            .lock()
            .closers
            .get(index)
            .map(TransportCloser::is_closed)
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: StreamRequest) -> Result<TransportStream> {
        let mut inner = self.inner.lock();
        inner.opened.push(request);

        let events = inner.pending.pop_front().unwrap_or_else(|| {
            let (_tx, rx) = mpsc::unbounded_channel();
            rx
        });
        let (closer, _close_rx) = TransportCloser::new();
        inner.closers.push(closer.clone());

        Ok(TransportStream::new(events, closer))
    }
}
