//! Stream request model and request authorization.

use std::fmt;

use reqwest::header::AUTHORIZATION;
use url::Url;

use crate::error::{Result, TransportError};

/// HTTP method used to open a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth 1.0a key material handed to a [`RequestSigner`]
#[derive(Clone, PartialEq, Eq, Default)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl OAuthCredentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: token.into(),
            token_secret: token_secret.into(),
        }
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("token", &self.token)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// HTTP Basic credentials
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Credentials attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    OAuth(OAuthCredentials),
    Basic(BasicCredentials),
}

/// The parts of a request a signer needs to produce an `Authorization` header.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: HttpMethod,
    /// Endpoint URL without the query string
    pub url: &'a Url,
    /// Query or form parameters, in transmission order
    pub params: &'a [(String, String)],
}

/// Produces the `Authorization` header value for OAuth-authenticated requests.
///
/// Signing itself lives outside this crate; implementations wrap whatever
/// OAuth library the application already uses.
pub trait RequestSigner: Send + Sync {
    fn authorization(
        &self,
        request: &SignableRequest<'_>,
        credentials: &OAuthCredentials,
    ) -> Result<String>;
}

/// A signer that returns a pre-built `Authorization` header.
#[derive(Clone)]
pub struct StaticAuthorization(String);

impl StaticAuthorization {
    pub fn new(header: impl Into<String>) -> Self {
        Self(header.into())
    }
}

impl fmt::Debug for StaticAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticAuthorization(<redacted>)")
    }
}

impl RequestSigner for StaticAuthorization {
    fn authorization(
        &self,
        _request: &SignableRequest<'_>,
        _credentials: &OAuthCredentials,
    ) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Everything needed to open one streaming connection.
///
/// GET requests carry `params` in the query string, POST requests carry them
/// as a form-encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub method: HttpMethod,
    /// Scheme and host, e.g. `https://stream.twitter.com`
    pub base_url: String,
    /// Absolute path, e.g. `/1.1/statuses/filter.json`
    pub path: String,
    pub params: Vec<(String, String)>,
    pub user_agent: String,
    pub credentials: Option<Credentials>,
    pub proxy: Option<String>,
}

impl StreamRequest {
    pub fn new(method: HttpMethod, base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            base_url: base_url.into(),
            path: path.into(),
            params: Vec::new(),
            user_agent: String::new(),
            credentials: None,
            proxy: None,
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Look up a parameter value by name
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Endpoint URL without any query string
    pub fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("{}: {}", self.base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(TransportError::InvalidRequest(format!(
                "{} cannot carry a path",
                self.base_url
            )));
        }
        url.set_path(&self.path);
        Ok(url)
    }

    /// Full request URL. GET parameters are appended as the query string.
    pub fn url(&self) -> Result<Url> {
        let mut url = self.endpoint()?;
        if self.method == HttpMethod::Get && !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }
        Ok(url)
    }

    /// Form-encoded body for POST requests
    pub fn form_body(&self) -> Option<String> {
        if self.method != HttpMethod::Post {
            return None;
        }
        Some(
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish(),
        )
    }
}

/// Attach credentials to an outgoing request.
///
/// Basic credentials are applied directly. OAuth credentials require a signer;
/// their absence is a [`TransportError::Signing`] error.
pub fn authorize(
    builder: reqwest::RequestBuilder,
    request: SignableRequest<'_>,
    credentials: Option<&Credentials>,
    signer: Option<&dyn RequestSigner>,
) -> Result<reqwest::RequestBuilder> {
    match credentials {
        None => Ok(builder),
        Some(Credentials::Basic(basic)) => {
            Ok(builder.basic_auth(&basic.username, Some(&basic.password)))
        }
        Some(Credentials::OAuth(oauth)) => {
            let signer = signer.ok_or_else(|| {
                TransportError::Signing(
                    "OAuth credentials configured without a request signer".to_string(),
                )
            })?;
            let header = signer.authorization(&request, oauth)?;
            Ok(builder.header(AUTHORIZATION, header))
        }
    }
}
