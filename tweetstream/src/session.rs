//! Connection sessions: one stream, its handlers, and its lifecycle.
//!
//! A session opens its request through a [`Transport`], then turns every
//! transport event into handler calls, strictly in arrival order. Handlers
//! run on the session's own task, one at a time.
//!
//! # States
//!
//! `Idle -> Connecting -> Streaming <-> Reconnecting -> Terminated`
//!
//! Decode failures and unexpected payloads are reported through the `error`
//! handler and the stream stays in `Streaming`. A transport disconnect moves
//! to `Reconnecting` until the transport connects again. The only fatal
//! condition is an exhausted reconnect budget, returned as
//! [`StreamError::Reconnect`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use stream_transport::{StreamRequest, Transport, TransportCloser, TransportEvent};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::callback::Callback;
use crate::classifier::Message;
use crate::config::StreamConfig;
use crate::control::{ControlErrorHandler, ControlSession};
use crate::error::{ReconnectError, Result, StreamError};
use crate::message::{ReconnectNotice, Status, StreamItem};
use crate::reactor::{wait_stopped, Reactor};
use crate::registry::CallbackRegistry;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Reconnecting,
    Terminated,
}

struct SessionShared {
    id: Uuid,
    state: Mutex<SessionState>,
    control_uri: OnceLock<String>,
    control: OnceLock<ControlSession>,
    last_status: Mutex<Option<Status>>,
    reconnect_attempts: AtomicU32,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    closer: Mutex<Option<TransportCloser>>,
    reactor: Reactor,
}

/// A cheap, cloneable reference to a running session.
///
/// Handlers registered with [`Callback::with_session`] receive one. It is
/// safe to stop the session from inside a handler.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    fn new(reactor: Reactor) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                id: Uuid::new_v4(),
                state: Mutex::new(SessionState::Idle),
                control_uri: OnceLock::new(),
                control: OnceLock::new(),
                last_status: Mutex::new(None),
                reconnect_attempts: AtomicU32::new(0),
                stop_requested: AtomicBool::new(false),
                stop_notify: Notify::new(),
                closer: Mutex::new(None),
                reactor,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    /// The control URI announced by a site stream, once received
    pub fn control_uri(&self) -> Option<&str> {
        self.shared.control_uri.get().map(String::as_str)
    }

    /// The control session, once a control URI was received
    pub fn control(&self) -> Option<ControlSession> {
        self.shared.control.get().cloned()
    }

    pub fn is_controllable(&self) -> bool {
        self.shared.control.get().is_some()
    }

    /// The most recent timeline status seen on this session
    pub fn last_status(&self) -> Option<Status> {
        self.shared.last_status.lock().clone()
    }

    /// Reconnect attempts since the last successful connection
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    pub fn reactor(&self) -> &Reactor {
        &self.shared.reactor
    }

    /// Whether `stop`, `stop_stream` or `close_connection` was called
    pub fn is_stopping(&self) -> bool {
        self.shared.stop_requested.load(Ordering::SeqCst)
    }

    /// Stop the reactor, ending this and every other session on it.
    /// Returns the last status seen.
    pub fn stop(&self) -> Option<Status> {
        self.shared.reactor.stop();
        self.stop_stream();
        self.last_status()
    }

    /// End this session after the message being dispatched, leaving the
    /// reactor running
    pub fn stop_stream(&self) {
        if !self.shared.stop_requested.swap(true, Ordering::SeqCst) {
            info!(session = %self.id(), "Stopping stream");
        }
        self.shared.stop_notify.notify_one();
    }

    /// Close this session's connection immediately, leaving the reactor
    /// running
    pub fn close_connection(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        if let Some(closer) = self.shared.closer.lock().as_ref() {
            info!(session = %self.id(), "Closing connection");
            closer.close();
        }
        self.shared.stop_notify.notify_one();
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.shared.state.lock(), state);
        if previous != state {
            debug!(session = %self.id(), from = ?previous, to = ?state, "Session state changed");
        }
    }

    fn downgrade(&self) -> Weak<SessionShared> {
        Arc::downgrade(&self.shared)
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for SessionHandle {}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("control_uri", &self.control_uri())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

/// Marks the session terminated and closes its transport on every exit
/// path, including a panicking handler
struct TerminateGuard<'a>(&'a SessionHandle);

impl Drop for TerminateGuard<'_> {
    fn drop(&mut self) {
        if let Some(closer) = self.0.shared.closer.lock().take() {
            closer.close();
        }
        self.0.set_state(SessionState::Terminated);
        info!(session = %self.0.id(), "Session terminated");
    }
}

/// One stream with its handlers
pub struct ConnectionSession {
    handle: SessionHandle,
    config: StreamConfig,
    registry: CallbackRegistry,
    block: Option<Callback<StreamItem>>,
    request: StreamRequest,
    transport: Arc<dyn Transport>,
}

impl ConnectionSession {
    /// Create an idle session. `config` and `registry` are copied in; later
    /// changes to the originals do not affect it.
    pub fn new(
        config: StreamConfig,
        registry: CallbackRegistry,
        request: StreamRequest,
        transport: Arc<dyn Transport>,
        reactor: Reactor,
    ) -> Self {
        Self {
            handle: SessionHandle::new(reactor),
            config,
            registry,
            block: None,
            request,
            transport,
        }
    }

    /// Set the call-site block that receives statuses and site-stream messages
    pub fn with_block(mut self, block: Option<Callback<StreamItem>>) -> Self {
        self.block = block;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Run until stopped, the transport ends, or reconnects are exhausted.
    ///
    /// Returns the last timeline status seen when the stream ends normally.
    pub async fn run(self) -> Result<Option<Status>> {
        let handle = self.handle.clone();
        let _guard = TerminateGuard(&handle);

        if handle.is_stopping() || handle.reactor().is_stopped() {
            return Ok(handle.last_status());
        }

        handle.set_state(SessionState::Connecting);
        let url = format!("{}{}", self.request.base_url, self.request.path);
        info!(session = %handle.id(), method = %self.request.method, url = %url, "Connecting stream");

        let mut stream = self.transport.open(self.request.clone()).await?;
        *handle.shared.closer.lock() = Some(stream.closer());
        let mut shutdown = handle.reactor().subscribe();

        loop {
            if handle.is_stopping() {
                break;
            }

            let event = tokio::select! {
                biased;
                _ = handle.shared.stop_notify.notified() => continue,
                _ = wait_stopped(&mut shutdown) => break,
                event = stream.next() => event,
            };

            let Some(event) = event else {
                debug!(session = %handle.id(), "Transport ended");
                break;
            };
            self.handle_event(event)?;
        }

        Ok(handle.last_status())
    }

    fn fire<T>(&self, callback: Option<&Callback<T>>, payload: T) {
        if let Some(callback) = callback {
            callback.invoke(payload, &self.handle);
        }
    }

    fn report_error(&self, message: String) {
        self.fire(self.registry.error(), message);
    }

    fn handle_event(&self, event: TransportEvent) -> Result<()> {
        let id = self.handle.id();
        match event {
            TransportEvent::Connected => {
                info!(session = %id, "Stream connected");
                self.handle.shared.reconnect_attempts.store(0, Ordering::SeqCst);
                self.handle.set_state(SessionState::Streaming);
                self.fire(self.registry.inited(), ());
            }
            TransportEvent::Line(line) => self.handle_line(&line),
            TransportEvent::Error(message) => {
                warn!(session = %id, "Stream error: {}", message);
                self.report_error(message);
            }
            TransportEvent::Unauthorized => {
                warn!(session = %id, "Stream unauthorized");
                self.fire(self.registry.unauthorized(), ());
            }
            TransportEvent::EnhanceYourCalm => {
                warn!(session = %id, "Stream rate limited");
                self.fire(self.registry.enhance_your_calm(), ());
            }
            TransportEvent::Reconnect { timeout, retries } => {
                info!(
                    session = %id,
                    retries,
                    timeout_ms = timeout.as_millis() as u64,
                    "Reconnecting"
                );
                self.handle.shared.reconnect_attempts.store(retries, Ordering::SeqCst);
                self.handle.set_state(SessionState::Reconnecting);
                self.fire(self.registry.reconnect(), ReconnectNotice { timeout, retries });
            }
            TransportEvent::NoDataReceived => {
                debug!(session = %id, "No data received");
                self.fire(self.registry.no_data_received(), ());
            }
            TransportEvent::MaxReconnects { timeout, retries } => {
                warn!(session = %id, retries, "Reconnect attempts exhausted");
                return Err(ReconnectError { timeout, retries }.into());
            }
        }
        Ok(())
    }

    fn handle_line(&self, line: &str) {
        let value = match self.config.decoder.decode(line) {
            Ok(value) => value,
            Err(e) => {
                debug!(session = %self.handle.id(), error = %e, "Undecodable line");
                self.report_error(StreamError::Decode(line.to_string()).to_string());
                return;
            }
        };

        match Message::from_value(&value) {
            Ok(message) => self.dispatch(message),
            Err(StreamError::UnexpectedPayload(_)) => {
                self.report_error(StreamError::UnexpectedPayload(line.to_string()).to_string());
                return;
            }
            Err(e) => {
                debug!(session = %self.handle.id(), error = %e, "Malformed message");
                self.report_error(e.to_string());
            }
        }

        self.fire(self.registry.anything(), value);
    }

    fn dispatch(&self, message: Message) {
        debug!(session = %self.handle.id(), kind = message.kind().name(), "Dispatching message");

        match message {
            Message::Control { control_uri } => self.attach_control(control_uri),
            Message::StallWarning(warning) => {
                warn!(session = %self.handle.id(), code = %warning.code, "Stall warning: {}", warning.message);
                self.fire(self.registry.stall_warning(), warning);
            }
            Message::Delete(notice) => self.fire(self.registry.delete(), notice),
            Message::ScrubGeo(notice) => self.fire(self.registry.scrub_geo(), notice),
            Message::Limit(notice) => self.fire(self.registry.limit(), notice),
            Message::DirectMessage(dm) => self.fire(self.registry.direct_message(), dm),
            Message::StatusWithheld(notice) => self.fire(self.registry.status_withheld(), notice),
            Message::UserWithheld(notice) => self.fire(self.registry.user_withheld(), notice),
            Message::Event(event) => {
                let callback = self.registry.event(&event.event);
                self.fire(callback, event);
            }
            Message::Friends(ids) => self.fire(self.registry.friends(), ids),
            Message::TimelineStatus(status) => {
                *self.handle.shared.last_status.lock() = Some(status.clone());
                if let Some(callback) = self.registry.timeline_status() {
                    callback.invoke(status.clone(), &self.handle);
                }
                self.fire(self.block.as_ref(), StreamItem::Status(status));
            }
            Message::ForUser(message) => {
                self.fire(self.block.as_ref(), StreamItem::ForUser(message));
            }
            Message::Unclassified => {}
        }
    }

    fn attach_control(&self, control_uri: String) {
        if let Err(ignored) = self.handle.shared.control_uri.set(control_uri) {
            warn!(
                session = %self.handle.id(),
                current = ?self.handle.control_uri(),
                ignored = %ignored,
                "Control URI already assigned"
            );
            return;
        }
        let Some(control_uri) = self.handle.control_uri() else {
            return;
        };

        let control = ControlSession::new(control_uri, &self.config);
        control.set_error_handler(
            self.registry
                .error()
                .map(|callback| forward_errors(callback.clone(), self.handle.downgrade())),
        );
        let control = self.handle.shared.control.get_or_init(|| control).clone();

        info!(session = %self.handle.id(), control_uri, "Stream is controllable");
        self.fire(self.registry.control(), control);
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("handle", &self.handle)
            .field("request", &self.request)
            .field("registry", &self.registry)
            .field("block", &self.block)
            .finish()
    }
}

/// Route control failures into a session's error handler without keeping
/// the session alive
fn forward_errors(callback: Callback<String>, session: Weak<SessionShared>) -> ControlErrorHandler {
    Arc::new(move |message: &str| match session.upgrade() {
        Some(shared) => callback.invoke(message.to_string(), &SessionHandle { shared }),
        None => {
            if !callback.invoke_detached(message.to_string()) {
                debug!("Dropping control error for a finished session: {}", message);
            }
        }
    })
}
