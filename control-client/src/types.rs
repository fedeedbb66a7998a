//! Response bodies returned by the control endpoints.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ControlError, Result};

/// A user attached to a site stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SiteStreamUser {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dm: bool,
}

/// Body of `info.json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SiteStreamInfo {
    #[serde(default)]
    pub users: Vec<SiteStreamUser>,
    #[serde(default)]
    pub with: Option<String>,
    #[serde(default)]
    pub replies: Option<String>,
    #[serde(default)]
    pub include_followings_activity: bool,
    #[serde(default)]
    pub include_user_changes: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Cursor {
    #[serde(default)]
    pub next: i64,
    #[serde(default)]
    pub previous: i64,
}

/// Body of `friends/ids.json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FriendsIds {
    #[serde(default)]
    pub user: Option<SiteStreamUser>,
    #[serde(default)]
    pub friends: Vec<u64>,
    #[serde(default)]
    pub cursor: Option<Cursor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parse a body that may be wrapped in a single `{"<envelope>": {...}}` object
pub(crate) fn parse_enveloped<T: DeserializeOwned>(body: &str, envelope: &str) -> Result<T> {
    let mut value: Value =
        serde_json::from_str(body).map_err(|e| ControlError::Parse(e.to_string()))?;

    if let Some(inner) = value.as_object_mut().and_then(|map| map.remove(envelope)) {
        value = inner;
    }

    serde_json::from_value(value).map_err(|e| ControlError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_info() {
        let body = r#"{"info":{"users":[{"id":42,"name":"bob","dm":true}],"with":"user","replies":"none","delimited":"none"}}"#;
        let info: SiteStreamInfo = parse_enveloped(body, "info").unwrap();

        assert_eq!(info.users.len(), 1);
        assert_eq!(info.users[0].id, 42);
        assert!(info.users[0].dm);
        assert_eq!(info.with.as_deref(), Some("user"));
        assert_eq!(info.extra.get("delimited"), Some(&Value::from("none")));
    }

    #[test]
    fn test_parse_bare_friends() {
        let body = r#"{"user":{"id":7},"friends":[1,2,3],"cursor":{"next":0,"previous":0}}"#;
        let friends: FriendsIds = parse_enveloped(body, "follow").unwrap();

        assert_eq!(friends.user.map(|u| u.id), Some(7));
        assert_eq!(friends.friends, vec![1, 2, 3]);
        assert_eq!(friends.cursor, Some(Cursor { next: 0, previous: 0 }));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let result: Result<FriendsIds> = parse_enveloped("<html>", "follow");
        assert!(matches!(result, Err(ControlError::Parse(_))));
    }
}
