//! Typed views over decoded stream messages.
//!
//! Each view names the fields the dispatcher and most callers need. Anything
//! else the server sent is kept in `extra` and reachable through `get`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Timestamp layout used by `created_at` fields, e.g. `Wed Aug 27 13:08:45 +0000 2008`
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

fn parse_created_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

macro_rules! impl_extra_lookup {
    ($name:ident) => {
        impl $name {
            /// Look up a field that has no named accessor
            pub fn get(&self, key: &str) -> Option<&Value> {
                self.extra.get(key)
            }
        }
    };
}

/// A user account
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub id_str: Option<String>,
    #[serde(default)]
    pub screen_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_extra_lookup!(User);

/// A tweet as delivered on a timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub id_str: Option<String>,
    pub text: String,
    pub user: User,
    #[serde(default)]
    pub in_reply_to_status_id: Option<u64>,
    #[serde(default, rename = "created_at")]
    created_at_raw: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_extra_lookup!(Status);

impl Status {
    /// Parsed creation time, if present and well formed
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_created_at(self.created_at_raw.as_deref())
    }

    /// The creation time exactly as sent
    pub fn created_at_str(&self) -> Option<&str> {
        self.created_at_raw.as_deref()
    }
}

/// A direct message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub text: String,
    /// Empty when the server omitted it
    #[serde(default)]
    pub sender: User,
    #[serde(default)]
    pub recipient: Option<User>,
    #[serde(default, rename = "created_at")]
    created_at_raw: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_extra_lookup!(DirectMessage);

impl DirectMessage {
    /// The sender; direct messages expose their author under this name too
    pub fn user(&self) -> &User {
        &self.sender
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_created_at(self.created_at_raw.as_deref())
    }
}

/// A named user-stream event such as `favorite` or `follow`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub event: String,
    #[serde(default)]
    pub source: Option<User>,
    #[serde(default)]
    pub target: Option<User>,
    #[serde(default)]
    pub target_object: Option<Value>,
    #[serde(default, rename = "created_at")]
    created_at_raw: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_extra_lookup!(UserEvent);

impl UserEvent {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_created_at(self.created_at_raw.as_deref())
    }
}

/// A status was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteNotice {
    pub status_id: u64,
    pub user_id: Option<u64>,
}

/// Geo data must be scrubbed up to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubGeoNotice {
    pub up_to_status_id: u64,
    pub user_id: Option<u64>,
}

/// Statuses matching the filter were withheld by rate limiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitNotice {
    /// Undelivered statuses since the connection opened
    pub track: u64,
}

/// The client is falling behind the stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallWarning {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub percent_full: Option<u32>,
}

/// A status is withheld in some countries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusWithheld {
    pub id: u64,
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub withheld_in_countries: Vec<String>,
}

/// A user is withheld in some countries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithheld {
    pub id: u64,
    #[serde(default)]
    pub withheld_in_countries: Vec<String>,
}

/// A site-stream envelope addressed to one followed user
#[derive(Debug, Clone, PartialEq)]
pub struct ForUserMessage {
    /// The addressed user id, as sent (numbers are rendered as strings)
    pub for_user: String,
    /// The wrapped message
    pub message: Value,
}

impl ForUserMessage {
    pub fn from_value(value: &Value) -> Option<Self> {
        let for_user = match value.get("for_user")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        Some(Self {
            for_user,
            message: value.get("message").cloned().unwrap_or(Value::Null),
        })
    }

    /// The wrapped message as a status, when it is one
    pub fn status(&self) -> Option<Status> {
        if self.message.get("text").is_none() || self.message.get("user").is_none() {
            return None;
        }
        Status::deserialize(&self.message).ok()
    }
}

/// A reconnect was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectNotice {
    /// Delay before the next attempt
    pub timeout: Duration,
    /// Attempts made since the last successful connection
    pub retries: u32,
}

/// What the call-site block of a stream method receives
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Status(Status),
    ForUser(ForUserMessage),
}

impl StreamItem {
    pub fn as_status(&self) -> Option<&Status> {
        match self {
            StreamItem::Status(status) => Some(status),
            StreamItem::ForUser(_) => None,
        }
    }

    pub fn as_for_user(&self) -> Option<&ForUserMessage> {
        match self {
            StreamItem::ForUser(message) => Some(message),
            StreamItem::Status(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_status_named_fields_and_extras() {
        let status: Status = serde_json::from_value(json!({
            "id": 1234,
            "text": "hi",
            "user": {"id": 3, "screen_name": "bob", "lang": "en"},
            "created_at": "Wed Aug 27 13:08:45 +0000 2008",
            "retweet_count": 4
        }))
        .unwrap();

        assert_eq!(status.text, "hi");
        assert_eq!(status.user.screen_name.as_deref(), Some("bob"));
        assert_eq!(status.user.get("lang"), Some(&json!("en")));
        assert_eq!(status.get("retweet_count"), Some(&json!(4)));
        assert_eq!(status.get("nothing"), None);

        let created = status.created_at().unwrap();
        assert_eq!((created.year(), created.month(), created.day()), (2008, 8, 27));
        assert_eq!(created.hour(), 13);
    }

    #[test]
    fn test_bad_timestamp_is_none() {
        let status: Status = serde_json::from_value(json!({
            "text": "hi",
            "user": {},
            "created_at": "yesterday"
        }))
        .unwrap();
        assert_eq!(status.created_at(), None);
        assert_eq!(status.created_at_str(), Some("yesterday"));
    }

    #[test]
    fn test_direct_message_user_is_sender() {
        let dm: DirectMessage = serde_json::from_value(json!({
            "id": 1,
            "text": "psst",
            "sender": {"id": 9, "screen_name": "alice"}
        }))
        .unwrap();
        assert_eq!(dm.user().screen_name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_direct_message_without_sender() {
        let dm: DirectMessage = serde_json::from_value(json!({"id": 1, "text": "psst"})).unwrap();
        assert_eq!(dm.text, "psst");
        assert_eq!(dm.sender, User::default());
    }

    #[test]
    fn test_for_user_accepts_numeric_id() {
        let message = ForUserMessage::from_value(&json!({
            "for_user": 12345,
            "message": {"text": "Oo oo aa aa", "user": {"screen_name": "monkey"}}
        }))
        .unwrap();

        assert_eq!(message.for_user, "12345");
        let status = message.status().unwrap();
        assert_eq!(status.user.screen_name.as_deref(), Some("monkey"));
    }

    #[test]
    fn test_for_user_wrapping_non_status() {
        let message = ForUserMessage::from_value(&json!({
            "for_user": "12345",
            "message": {"friends": [1, 2]}
        }))
        .unwrap();
        assert!(message.status().is_none());
    }
}
