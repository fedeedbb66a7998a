//! Minimal HTTP client for site-stream control endpoints
//!
//! A site stream hands out a control URI once it is connected. This crate
//! issues the management requests scoped to that URI: reading session info,
//! adding and removing followed users, and listing a user's friends. Every
//! operation is exactly one authenticated request.

mod error;
mod ids;
mod types;

pub use error::{ControlError, Result};
pub use ids::UserIds;
pub use types::{Cursor, FriendsIds, SiteStreamInfo, SiteStreamUser};

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use stream_transport::{authorize, Credentials, HttpMethod, RequestSigner, SignableRequest};
use tracing::debug;
use url::Url;

/// Default host control URIs are resolved against
pub const DEFAULT_CONTROL_HOST: &str = "https://sitestream.twitter.com";

/// An authenticated HTTP client bound to one control URI
#[derive(Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
    control_uri: String,
    credentials: Option<Credentials>,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl ControlClient {
    /// Create a client for `control_uri` on the default site-stream host
    pub fn new(control_uri: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: DEFAULT_CONTROL_HOST.to_string(),
            control_uri: control_uri.into(),
            credentials: None,
            signer: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_signer(mut self, signer: Option<Arc<dyn RequestSigner>>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        if let Ok(http) = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
        {
            self.http = http;
        }
        self
    }

    pub fn control_uri(&self) -> &str {
        &self.control_uri
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Read the stream's session information
    pub async fn info(&self) -> Result<SiteStreamInfo> {
        let body = self.request(HttpMethod::Get, "info.json", Vec::new()).await?;
        types::parse_enveloped(&body, "info")
    }

    /// Add one or more users to the stream
    pub async fn add_user(&self, ids: impl Into<UserIds>) -> Result<()> {
        let params = vec![("user_id".to_string(), ids.into().joined())];
        self.request(HttpMethod::Post, "add_user.json", params).await?;
        Ok(())
    }

    /// Remove one or more users from the stream
    pub async fn remove_user(&self, ids: impl Into<UserIds>) -> Result<()> {
        let params = vec![("user_id".to_string(), ids.into().joined())];
        self.request(HttpMethod::Post, "remove_user.json", params).await?;
        Ok(())
    }

    /// List the friends of a user attached to the stream
    pub async fn friends_ids(&self, id: impl Into<UserIds>) -> Result<FriendsIds> {
        let params = vec![("user_id".to_string(), id.into().joined())];
        let body = self
            .request(HttpMethod::Post, "friends/ids.json", params)
            .await?;
        types::parse_enveloped(&body, "follow")
    }

    /// Absolute URL of an operation under the control URI
    pub fn endpoint(&self, operation: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ControlError::Network(format!("{}: {}", self.base_url, e)))?;
        let path = format!(
            "/{}/{}",
            self.control_uri.trim_matches('/'),
            operation.trim_start_matches('/')
        );
        base.join(&path)
            .map_err(|e| ControlError::Network(format!("{}: {}", path, e)))
    }

    async fn request(
        &self,
        method: HttpMethod,
        operation: &str,
        params: Vec<(String, String)>,
    ) -> Result<String> {
        let url = self.endpoint(operation)?;

        let builder = match method {
            HttpMethod::Get => self.http.get(url.clone()),
            HttpMethod::Post => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.iter())
                    .finish();
                self.http
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body)
            }
        };

        let builder = authorize(
            builder,
            SignableRequest {
                method,
                url: &url,
                params: &params,
            },
            self.credentials.as_ref(),
            self.signer.as_deref(),
        )
        .map_err(|e| ControlError::Signing(e.to_string()))?;

        debug!(%method, %url, "Sending control request");
        let response = builder
            .send()
            .await
            .map_err(|e| ControlError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ControlError::Status(status));
        }

        response
            .text()
            .await
            .map_err(|e| ControlError::Network(e.to_string()))
    }
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("base_url", &self.base_url)
            .field("control_uri", &self.control_uri)
            .field("credentials", &self.credentials)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}
