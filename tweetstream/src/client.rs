//! The stream client facade.
//!
//! `StreamClient` holds the configuration and the handlers that every new
//! session starts from, plus the reactor its sessions attach to. Each stream
//! call builds an [`Endpoint`] request, snapshots the registry into a fresh
//! [`ConnectionSession`], and runs it.
//!
//! The async stream methods run on the caller's runtime. Only the blocking
//! [`StreamClient::start`] creates its own, and it refuses to run inside an
//! existing one.

use std::fmt;
use std::sync::Arc;

use control_client::UserIds;
use parking_lot::Mutex;
use serde_json::Value;
use stream_transport::Transport;
use tracing::{debug, info};

use crate::callback::Callback;
use crate::config::StreamConfig;
use crate::control::ControlSession;
use crate::error::{Result, StreamError};
use crate::message::{
    DeleteNotice, DirectMessage, LimitNotice, ReconnectNotice, ScrubGeoNotice, StallWarning,
    Status, StatusWithheld, StreamItem, UserEvent, UserWithheld,
};
use crate::params::{site_stream_params, BoundingBox, Endpoint, StreamParams};
use crate::reactor::Reactor;
use crate::registry::CallbackRegistry;
use crate::session::{ConnectionSession, SessionHandle};

/// Forwards the chainable `on_*` setters to the registry
macro_rules! forward_setters {
    ($( $setter:ident : $payload:ty ),+ $(,)?) => {
        $(
            #[doc = concat!("See [`CallbackRegistry::", stringify!($setter), "`]")]
            pub fn $setter(&mut self, callback: Callback<$payload>) -> &mut Self {
                self.registry.$setter(callback);
                self
            }
        )+
    };
}

/// Entry point for opening streams.
///
/// ```no_run
/// use tweetstream::{Callback, StreamClient, StreamConfig};
///
/// # async fn run() -> tweetstream::Result<()> {
/// let mut client = StreamClient::new(StreamConfig::basic("user", "secret"));
/// client.on_error(Callback::new(|message: String| eprintln!("{}", message)));
///
/// let block = Callback::with_session(|item: tweetstream::StreamItem, session| {
///     if let Some(status) = item.as_status() {
///         println!("{}", status.text);
///         session.stop_stream();
///     }
/// });
/// client.track(["rust", "tokio"], Some(block)).await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamClient {
    config: StreamConfig,
    registry: CallbackRegistry,
    transport: Arc<dyn Transport>,
    reactor: Reactor,
    current: Mutex<Option<SessionHandle>>,
}

impl StreamClient {
    /// Create a client that connects over HTTP as described by `config`
    pub fn new(config: StreamConfig) -> Self {
        let transport = Arc::new(config.http_transport());
        Self::with_transport(config, transport)
    }

    /// Create a client that opens streams through `transport`
    pub fn with_transport(config: StreamConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            registry: CallbackRegistry::new(),
            transport,
            reactor: Reactor::new(),
            current: Mutex::new(None),
        }
    }

    /// Attach sessions to a shared reactor instead of a private one
    pub fn with_reactor(mut self, reactor: Reactor) -> Self {
        self.reactor = reactor;
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CallbackRegistry {
        &mut self.registry
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    forward_setters! {
        on_delete: DeleteNotice,
        on_scrub_geo: ScrubGeoNotice,
        on_limit: LimitNotice,
        on_error: String,
        on_enhance_your_calm: (),
        on_unauthorized: (),
        on_reconnect: ReconnectNotice,
        on_inited: (),
        on_direct_message: DirectMessage,
        on_timeline_status: Status,
        on_anything: Value,
        on_no_data_received: (),
        on_status_withheld: StatusWithheld,
        on_user_withheld: UserWithheld,
        on_control: ControlSession,
        on_friends: Vec<u64>,
        on_stall_warning: StallWarning,
    }

    /// Set the handler for a named user-stream event, e.g. `favorite`
    pub fn on_event(&mut self, name: impl Into<String>, callback: Callback<UserEvent>) -> &mut Self {
        self.registry.on_event(name, callback);
        self
    }

    /// Statuses matching any of `keywords`. Items may be single keywords or
    /// comma-joined lists.
    pub async fn track<I, S>(&self, keywords: I, block: Option<Callback<StreamItem>>) -> Result<Option<Status>>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.filter(StreamParams::new().with_list("track", keywords), block)
            .await
    }

    /// Statuses from the given users
    pub async fn follow(
        &self,
        user_ids: impl Into<UserIds>,
        block: Option<Callback<StreamItem>>,
    ) -> Result<Option<Status>> {
        let user_ids = user_ids.into();
        self.filter(StreamParams::new().with("follow", user_ids.joined()), block)
            .await
    }

    /// Statuses located inside any of `boxes`
    pub async fn locations<I>(&self, boxes: I, block: Option<Callback<StreamItem>>) -> Result<Option<Status>>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        self.filter(StreamParams::new().with_list("locations", boxes), block)
            .await
    }

    pub async fn filter(&self, params: StreamParams, block: Option<Callback<StreamItem>>) -> Result<Option<Status>> {
        self.connect(Endpoint::Filter, params, block).await
    }

    pub async fn sample(&self, params: StreamParams, block: Option<Callback<StreamItem>>) -> Result<Option<Status>> {
        self.connect(Endpoint::Sample, params, block).await
    }

    pub async fn firehose(&self, params: StreamParams, block: Option<Callback<StreamItem>>) -> Result<Option<Status>> {
        self.connect(Endpoint::Firehose, params, block).await
    }

    pub async fn links(&self, params: StreamParams, block: Option<Callback<StreamItem>>) -> Result<Option<Status>> {
        self.connect(Endpoint::Links, params, block).await
    }

    pub async fn retweet(&self, params: StreamParams, block: Option<Callback<StreamItem>>) -> Result<Option<Status>> {
        self.connect(Endpoint::Retweet, params, block).await
    }

    /// The authenticated user's stream. Accepts `replies`, `with` and
    /// `stall_warnings`.
    pub async fn userstream(&self, params: StreamParams, block: Option<Callback<StreamItem>>) -> Result<Option<Status>> {
        self.connect(Endpoint::User, params, block).await
    }

    /// A site stream for `user_ids`. Messages arrive wrapped in
    /// [`StreamItem::ForUser`]; `followings=true` is sent as
    /// `with=followings`.
    pub async fn sitestream(
        &self,
        user_ids: impl Into<UserIds>,
        params: StreamParams,
        block: Option<Callback<StreamItem>>,
    ) -> Result<Option<Status>> {
        let params = site_stream_params(user_ids.into(), params);
        self.connect(Endpoint::Site, params, block).await
    }

    /// Open `endpoint` and dispatch until the session ends.
    ///
    /// Returns the last timeline status on a normal end, or
    /// [`StreamError::Reconnect`] once reconnects are exhausted.
    pub async fn connect(
        &self,
        endpoint: Endpoint,
        params: StreamParams,
        block: Option<Callback<StreamItem>>,
    ) -> Result<Option<Status>> {
        self.connect_with(endpoint, params, CallbackRegistry::new(), block)
            .await
    }

    /// Like [`connect`](Self::connect), with `overrides` replacing the
    /// client's handlers for this stream only
    pub async fn connect_with(
        &self,
        endpoint: Endpoint,
        params: StreamParams,
        overrides: CallbackRegistry,
        block: Option<Callback<StreamItem>>,
    ) -> Result<Option<Status>> {
        self.config.validate()?;
        self.session_with(endpoint, params, overrides, block)
            .run()
            .await
    }

    /// Build a session for `endpoint` without running it.
    ///
    /// The session becomes the target of [`stop`](Self::stop),
    /// [`stop_stream`](Self::stop_stream) and
    /// [`close_connection`](Self::close_connection).
    pub fn session(
        &self,
        endpoint: Endpoint,
        params: StreamParams,
        block: Option<Callback<StreamItem>>,
    ) -> ConnectionSession {
        self.session_with(endpoint, params, CallbackRegistry::new(), block)
    }

    /// Build a session whose handlers are the client's merged with
    /// `overrides`. The client's own registry is not touched.
    pub fn session_with(
        &self,
        endpoint: Endpoint,
        params: StreamParams,
        overrides: CallbackRegistry,
        block: Option<Callback<StreamItem>>,
    ) -> ConnectionSession {
        let request = endpoint.request(&self.config, params);
        let session = ConnectionSession::new(
            self.config.clone(),
            self.registry.merged(&overrides),
            request,
            Arc::clone(&self.transport),
            self.reactor.clone(),
        )
        .with_block(block);

        debug!(session = %session.handle().id(), endpoint = endpoint.name(), "Session created");
        *self.current.lock() = Some(session.handle());
        session
    }

    /// Run `endpoint` to completion on a private single-threaded runtime.
    ///
    /// Fails with [`StreamError::Runtime`] when called from inside a tokio
    /// runtime, without opening anything. An already running runtime is never
    /// joined; async callers use [`connect`](Self::connect) instead, which
    /// attaches to whatever runtime is driving it.
    pub fn start(
        &self,
        endpoint: Endpoint,
        params: StreamParams,
        block: Option<Callback<StreamItem>>,
    ) -> Result<Option<Status>> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(StreamError::Runtime(
                "start cannot block inside a tokio runtime; use connect".to_string(),
            ));
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StreamError::Runtime(format!("Failed to create runtime: {}", e)))?;

        info!(endpoint = endpoint.name(), "Starting stream");
        rt.block_on(self.connect(endpoint, params, block))
    }

    /// Handle of the most recently created session
    pub fn current_session(&self) -> Option<SessionHandle> {
        self.current.lock().clone()
    }

    /// Stop the reactor and with it every session. Returns the last status
    /// of the most recent session.
    pub fn stop(&self) -> Option<Status> {
        match self.current_session() {
            Some(session) => session.stop(),
            None => {
                self.reactor.stop();
                None
            }
        }
    }

    /// End the most recent session, leaving the reactor running
    pub fn stop_stream(&self) {
        if let Some(session) = self.current_session() {
            session.stop_stream();
        }
    }

    /// Close the most recent session's connection, leaving the reactor running
    pub fn close_connection(&self) {
        if let Some(session) = self.current_session() {
            session.close_connection();
        }
    }
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("reactor", &self.reactor)
            .field("current", &self.current_session())
            .finish()
    }
}
