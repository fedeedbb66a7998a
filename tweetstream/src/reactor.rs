//! Shared shutdown signal for every session on one run loop.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// The run loop sessions are attached to.
///
/// Stopping the reactor ends every session bound to it. Ending one session
/// with `stop_stream` or `close_connection` leaves the reactor running.
#[derive(Debug, Clone)]
pub struct Reactor {
    shutdown: Arc<watch::Sender<bool>>,
}

impl Reactor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown: Arc::new(shutdown),
        }
    }

    /// Signal every attached session to end
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Reactor stopping");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Resolves once the reactor is stopped
    pub async fn stopped(&self) {
        wait_stopped(&mut self.subscribe()).await
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) async fn wait_stopped(rx: &mut watch::Receiver<bool>) {
    let result = rx.wait_for(|stopped| *stopped).await.map(|_| ());
    // Err means every Reactor clone is gone and no stop can arrive
    if result.is_err() {
        std::future::pending::<()>().await;
    }
}
