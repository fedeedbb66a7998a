//! Endpoints and request parameters.

use std::fmt;

use control_client::UserIds;
use stream_transport::{HttpMethod, StreamRequest};

use crate::config::StreamConfig;

/// Join list values into the comma-separated wire form.
///
/// Items are trimmed and empty items dropped, so pre-joined strings and
/// individual items normalize to the same value.
pub fn join_list<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    values
        .into_iter()
        .map(|v| v.to_string())
        .flat_map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Ordered query or form parameters. Setting a key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamParams {
    pairs: Vec<(String, String)>,
}

impl StreamParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Set a list-valued parameter such as `track`, `follow` or `locations`
    pub fn with_list<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.set(key, join_list(values));
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for StreamParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = StreamParams::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// A geographic box for `locations`, south-west corner first
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub sw_lng: f64,
    pub sw_lat: f64,
    pub ne_lng: f64,
    pub ne_lat: f64,
}

impl BoundingBox {
    pub fn new(sw_lng: f64, sw_lat: f64, ne_lng: f64, ne_lat: f64) -> Self {
        Self {
            sw_lng,
            sw_lat,
            ne_lng,
            ne_lat,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.sw_lng, self.sw_lat, self.ne_lng, self.ne_lat)
    }
}

/// Streaming resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Sample,
    Firehose,
    Links,
    Retweet,
    Filter,
    User,
    Site,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Sample => "sample",
            Endpoint::Firehose => "firehose",
            Endpoint::Links => "links",
            Endpoint::Retweet => "retweet",
            Endpoint::Filter => "filter",
            Endpoint::User => "user",
            Endpoint::Site => "site",
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Endpoint::Filter | Endpoint::Site => HttpMethod::Post,
            _ => HttpMethod::Get,
        }
    }

    /// Request path, e.g. `/1.1/statuses/filter.json`
    pub fn path(&self, api_version: &str) -> String {
        match self {
            Endpoint::User | Endpoint::Site => format!("/{}/{}.json", api_version, self.name()),
            _ => format!("/{}/statuses/{}.json", api_version, self.name()),
        }
    }

    pub fn host<'a>(&self, config: &'a StreamConfig) -> &'a str {
        match self {
            Endpoint::User => &config.user_stream_host,
            Endpoint::Site => &config.site_stream_host,
            _ => &config.stream_host,
        }
    }

    /// Build the request for this endpoint, copying credentials, user agent
    /// and proxy out of `config`
    pub fn request(&self, config: &StreamConfig, params: StreamParams) -> StreamRequest {
        StreamRequest::new(self.method(), self.host(config), self.path(&config.api_version))
            .with_params(params.into_pairs())
            .with_user_agent(config.user_agent.clone())
            .with_credentials(config.credentials.clone())
            .with_proxy(config.proxy.as_ref().map(|p| p.uri.clone()))
    }
}

/// Parameters for a site stream following `user_ids`.
///
/// `followings=true` is shorthand for `with=followings`.
pub fn site_stream_params(user_ids: UserIds, mut params: StreamParams) -> StreamParams {
    if !user_ids.is_empty() {
        params.set("follow", user_ids.joined());
    }
    if let Some(followings) = params.remove("followings") {
        if followings == "true" {
            params.set("with", "followings");
        }
    }
    params
}
