//! Configuration for stream sessions
//!
//! A [`StreamConfig`] is an immutable value. Sessions copy it when they are
//! created, so changing a configuration afterwards never affects a session
//! that is already running.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use stream_transport::{
    BasicCredentials, Credentials, HttpTransport, OAuthCredentials, ReconnectPolicy,
    RequestSigner, StaticAuthorization,
};
use url::Url;

use crate::decoder::{MessageDecoder, SerdeJsonDecoder};
use crate::error::{Result, StreamError};

/// Default User-Agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("TweetStream Rust ", env!("CARGO_PKG_VERSION"));

/// Proxy settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy URI, e.g. `http://proxy.local:8080`
    pub uri: String,
}

impl ProxyConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Configuration for stream sessions
#[derive(Clone)]
pub struct StreamConfig {
    /// OAuth or Basic credentials
    /// Default: none
    pub credentials: Option<Credentials>,

    /// User-Agent header value
    /// Default: "TweetStream Rust <version>"
    pub user_agent: String,

    /// Optional HTTP proxy
    pub proxy: Option<ProxyConfig>,

    /// API version prefix of endpoint paths
    /// Default: "1.1"
    pub api_version: String,

    /// Host of the public statuses endpoints
    /// Default: https://stream.twitter.com
    pub stream_host: String,

    /// Host of the user stream
    /// Default: https://userstream.twitter.com
    pub user_stream_host: String,

    /// Host of the site stream and its control endpoints
    /// Default: https://sitestream.twitter.com
    pub site_stream_host: String,

    /// Silence after which `no_data_received` fires
    /// Default: 90 seconds
    pub stall_timeout: Duration,

    /// Backoff schedule between reconnects
    pub reconnect_policy: ReconnectPolicy,

    /// Decoder applied to every stream line
    /// Default: serde_json
    pub decoder: Arc<dyn MessageDecoder>,

    /// Produces OAuth `Authorization` headers
    /// Default: none
    pub signer: Option<Arc<dyn RequestSigner>>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            api_version: "1.1".to_string(),
            stream_host: "https://stream.twitter.com".to_string(),
            user_stream_host: "https://userstream.twitter.com".to_string(),
            site_stream_host: "https://sitestream.twitter.com".to_string(),
            stall_timeout: Duration::from_secs(90),
            reconnect_policy: ReconnectPolicy::default(),
            decoder: Arc::new(SerdeJsonDecoder),
            signer: None,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// OAuth credentials signed by `signer`
    pub fn oauth(credentials: OAuthCredentials, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            credentials: Some(Credentials::OAuth(credentials)),
            signer: Some(signer),
            ..Default::default()
        }
    }

    /// HTTP Basic credentials
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some(Credentials::Basic(BasicCredentials::new(username, password))),
            ..Default::default()
        }
    }

    /// Read `TWEETSTREAM_*` environment variables over the defaults
    ///
    /// - `TWEETSTREAM_AUTH_METHOD`: `oauth` (default) or `basic`
    /// - `TWEETSTREAM_CONSUMER_KEY`, `TWEETSTREAM_CONSUMER_SECRET`,
    ///   `TWEETSTREAM_OAUTH_TOKEN`, `TWEETSTREAM_OAUTH_TOKEN_SECRET`
    /// - `TWEETSTREAM_AUTHORIZATION`: pre-built OAuth header used as the signer
    /// - `TWEETSTREAM_USERNAME`, `TWEETSTREAM_PASSWORD`
    /// - `TWEETSTREAM_USER_AGENT`, `TWEETSTREAM_PROXY`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::default();

        match var("TWEETSTREAM_AUTH_METHOD").as_deref() {
            Some("basic") => {
                if let Some(username) = var("TWEETSTREAM_USERNAME") {
                    let password = var("TWEETSTREAM_PASSWORD").unwrap_or_default();
                    config.credentials =
                        Some(Credentials::Basic(BasicCredentials::new(username, password)));
                }
            }
            None | Some("oauth") => {
                if let Some(consumer_key) = var("TWEETSTREAM_CONSUMER_KEY") {
                    config.credentials = Some(Credentials::OAuth(OAuthCredentials::new(
                        consumer_key,
                        var("TWEETSTREAM_CONSUMER_SECRET").unwrap_or_default(),
                        var("TWEETSTREAM_OAUTH_TOKEN").unwrap_or_default(),
                        var("TWEETSTREAM_OAUTH_TOKEN_SECRET").unwrap_or_default(),
                    )));
                }
                if let Some(header) = var("TWEETSTREAM_AUTHORIZATION") {
                    config.signer = Some(Arc::new(StaticAuthorization::new(header)));
                    // A pre-built header needs no key material of its own
                    config
                        .credentials
                        .get_or_insert_with(|| Credentials::OAuth(OAuthCredentials::default()));
                }
            }
            Some(other) => {
                return Err(StreamError::Configuration(format!(
                    "Unknown auth method {:?}: expected oauth or basic",
                    other
                )))
            }
        }

        if let Some(user_agent) = var("TWEETSTREAM_USER_AGENT") {
            config.user_agent = user_agent;
        }
        if let Some(proxy) = var("TWEETSTREAM_PROXY") {
            config.proxy = Some(ProxyConfig::new(proxy));
        }

        Ok(config)
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_stream_host(mut self, host: impl Into<String>) -> Self {
        self.stream_host = host.into();
        self
    }

    pub fn with_user_stream_host(mut self, host: impl Into<String>) -> Self {
        self.user_stream_host = host.into();
        self
    }

    pub fn with_site_stream_host(mut self, host: impl Into<String>) -> Self {
        self.site_stream_host = host.into();
        self
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn MessageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_signer(mut self, signer: Option<Arc<dyn RequestSigner>>) -> Self {
        self.signer = signer;
        self
    }

    /// The HTTP transport this configuration describes
    pub fn http_transport(&self) -> HttpTransport {
        HttpTransport::new()
            .with_policy(self.reconnect_policy.clone())
            .with_stall_timeout(self.stall_timeout)
            .with_signer(self.signer.clone())
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(StreamError::Configuration(
                "User agent must not be empty".to_string(),
            ));
        }

        if self.api_version.trim().is_empty() {
            return Err(StreamError::Configuration(
                "API version must not be empty".to_string(),
            ));
        }

        for (name, host) in [
            ("stream host", &self.stream_host),
            ("user stream host", &self.user_stream_host),
            ("site stream host", &self.site_stream_host),
        ] {
            Url::parse(host).map_err(|e| {
                StreamError::Configuration(format!("Invalid {} {:?}: {}", name, host, e))
            })?;
        }

        if let Some(proxy) = &self.proxy {
            Url::parse(&proxy.uri).map_err(|e| {
                StreamError::Configuration(format!("Invalid proxy URI {:?}: {}", proxy.uri, e))
            })?;
        }

        if self.stall_timeout == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Stall timeout must be greater than 0".to_string(),
            ));
        }

        match &self.credentials {
            Some(Credentials::OAuth(_)) if self.signer.is_none() => {
                return Err(StreamError::Configuration(
                    "OAuth credentials require a request signer".to_string(),
                ));
            }
            Some(Credentials::Basic(basic)) if basic.username.is_empty() => {
                return Err(StreamError::Configuration(
                    "Basic credentials require a username".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }
}

impl fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfig")
            .field("credentials", &self.credentials)
            .field("user_agent", &self.user_agent)
            .field("proxy", &self.proxy)
            .field("api_version", &self.api_version)
            .field("stream_host", &self.stream_host)
            .field("user_stream_host", &self.user_stream_host)
            .field("site_stream_host", &self.site_stream_host)
            .field("stall_timeout", &self.stall_timeout)
            .field("reconnect_policy", &self.reconnect_policy)
            .field("decoder", &self.decoder.name())
            .field("signer", &self.signer.is_some())
            .finish()
    }
}
