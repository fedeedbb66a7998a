//! # tweetstream
//!
//! A client for long-lived streaming HTTP endpoints that deliver
//! newline-delimited JSON, modelled on the Twitter Streaming API.
//!
//! A [`StreamClient`] opens a [`ConnectionSession`] per stream. The session
//! reads lines from a [`Transport`], decodes and classifies each one, and
//! calls the matching handler from its [`CallbackRegistry`]. Reconnects with
//! backoff happen below the session in the transport; once they are
//! exhausted the session ends with [`ReconnectError`].
//!
//! Site streams announce a control URI. The session then exposes a
//! [`ControlSession`] for adding and removing users on the live stream.
//!
//! ## Example
//!
//! ```no_run
//! use tweetstream::{Callback, DeleteNotice, StreamClient, StreamConfig, StreamParams};
//!
//! # async fn run() -> tweetstream::Result<()> {
//! let mut client = StreamClient::new(StreamConfig::basic("user", "secret"));
//! client
//!     .on_delete(Callback::new(|notice: DeleteNotice| {
//!         println!("status {} deleted", notice.status_id);
//!     }))
//!     .on_reconnect(Callback::new(|notice: tweetstream::ReconnectNotice| {
//!         println!("reconnect #{} in {:?}", notice.retries, notice.timeout);
//!     }));
//!
//! let last = client.sample(StreamParams::new(), None).await?;
//! println!("last status: {:?}", last.map(|s| s.text));
//! # Ok(())
//! # }
//! ```

mod callback;
mod classifier;
mod client;
mod config;
mod control;
mod decoder;
mod error;
pub mod logging;
mod message;
mod params;
mod reactor;
mod registry;
mod session;

pub use callback::Callback;
pub use classifier::{classify, Message, MessageKind};
pub use client::StreamClient;
pub use config::{ProxyConfig, StreamConfig, DEFAULT_USER_AGENT};
pub use control::{
    ControlErrorHandler, ControlSession, ADD_USER_FAILED, FRIENDS_IDS_FAILED, INFO_FAILED,
    REMOVE_USER_FAILED,
};
pub use decoder::{DecodeError, MessageDecoder, SerdeJsonDecoder};
pub use error::{ReconnectError, Result, StreamError};
pub use message::{
    DeleteNotice, DirectMessage, ForUserMessage, LimitNotice, ReconnectNotice, ScrubGeoNotice,
    StallWarning, Status, StatusWithheld, StreamItem, User, UserEvent, UserWithheld,
    CREATED_AT_FORMAT,
};
pub use params::{join_list, site_stream_params, BoundingBox, Endpoint, StreamParams};
pub use reactor::Reactor;
pub use registry::{CallbackRegistry, EventName};
pub use session::{ConnectionSession, SessionHandle, SessionState};

pub use control_client::{ControlError, Cursor, FriendsIds, SiteStreamInfo, SiteStreamUser, UserIds};
pub use stream_transport::{
    BasicCredentials, Credentials, HttpMethod, HttpTransport, OAuthCredentials, ReconnectPolicy,
    RequestSigner, SignableRequest, StaticAuthorization, StreamRequest, Transport,
};
