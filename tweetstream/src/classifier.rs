//! Message classification.
//!
//! Exactly one kind is chosen per message by checking top-level keys in a
//! fixed order; the first match wins and unrelated keys are ignored.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, StreamError};
use crate::message::{
    DeleteNotice, DirectMessage, ForUserMessage, LimitNotice, ScrubGeoNotice, StallWarning,
    Status, StatusWithheld, UserEvent, UserWithheld,
};

/// The shape a decoded message was recognized as
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Control,
    StallWarning,
    Delete,
    ScrubGeo,
    Limit,
    DirectMessage,
    StatusWithheld,
    UserWithheld,
    /// A user-stream event, keyed by its `event` name
    NamedEvent(String),
    FriendsList,
    TimelineStatus,
    ForUser,
    /// Nothing specific matched
    Unclassified,
}

impl MessageKind {
    /// Registry name of the handler this kind dispatches to
    pub fn name(&self) -> &str {
        match self {
            MessageKind::Control => "control",
            MessageKind::StallWarning => "stall_warning",
            MessageKind::Delete => "delete",
            MessageKind::ScrubGeo => "scrub_geo",
            MessageKind::Limit => "limit",
            MessageKind::DirectMessage => "direct_message",
            MessageKind::StatusWithheld => "status_withheld",
            MessageKind::UserWithheld => "user_withheld",
            MessageKind::NamedEvent(name) => name,
            MessageKind::FriendsList => "friends",
            MessageKind::TimelineStatus => "timeline_status",
            MessageKind::ForUser => "for_user",
            MessageKind::Unclassified => "unclassified",
        }
    }
}

/// A key counts as present when it is neither missing, `null`, nor `false`
fn present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

fn nested(value: &Value, outer: &str, inner: &str) -> bool {
    present(value.get(outer).and_then(|o| o.get(inner)))
}

/// Classify a decoded message.
///
/// Fails with [`StreamError::UnexpectedPayload`] when the value is not a JSON
/// object.
pub fn classify(value: &Value) -> Result<MessageKind> {
    if !value.is_object() {
        return Err(StreamError::UnexpectedPayload(value.to_string()));
    }

    let kind = if nested(value, "control", "control_uri") {
        MessageKind::Control
    } else if present(value.get("warning")) {
        MessageKind::StallWarning
    } else if nested(value, "delete", "status") {
        MessageKind::Delete
    } else if nested(value, "scrub_geo", "up_to_status_id") {
        MessageKind::ScrubGeo
    } else if nested(value, "limit", "track") {
        MessageKind::Limit
    } else if present(value.get("direct_message")) {
        MessageKind::DirectMessage
    } else if present(value.get("status_withheld")) {
        MessageKind::StatusWithheld
    } else if present(value.get("user_withheld")) {
        MessageKind::UserWithheld
    } else if present(value.get("event")) {
        match value.get("event") {
            Some(Value::String(name)) => MessageKind::NamedEvent(name.clone()),
            Some(other) => MessageKind::NamedEvent(other.to_string()),
            None => MessageKind::Unclassified,
        }
    } else if present(value.get("friends")) {
        MessageKind::FriendsList
    } else if present(value.get("text")) && present(value.get("user")) {
        MessageKind::TimelineStatus
    } else if present(value.get("for_user")) {
        MessageKind::ForUser
    } else {
        MessageKind::Unclassified
    };

    Ok(kind)
}

/// A classified message with its typed payload
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Control { control_uri: String },
    StallWarning(StallWarning),
    Delete(DeleteNotice),
    ScrubGeo(ScrubGeoNotice),
    Limit(LimitNotice),
    DirectMessage(DirectMessage),
    StatusWithheld(StatusWithheld),
    UserWithheld(UserWithheld),
    Event(UserEvent),
    Friends(Vec<u64>),
    TimelineStatus(Status),
    ForUser(ForUserMessage),
    Unclassified,
}

impl Message {
    /// Classify `value` and extract the payload for its kind
    pub fn from_value(value: &Value) -> Result<Message> {
        let kind = classify(value)?;
        Self::extract(&kind, value)
    }

    fn extract(kind: &MessageKind, value: &Value) -> Result<Message> {
        let message = match kind {
            MessageKind::Control => {
                let uri = value["control"]["control_uri"]
                    .as_str()
                    .ok_or_else(|| malformed(kind, "control_uri is not a string"))?;
                Message::Control {
                    control_uri: uri.to_string(),
                }
            }
            MessageKind::StallWarning => Message::StallWarning(field(kind, &value["warning"])?),
            MessageKind::Delete => {
                let status = &value["delete"]["status"];
                Message::Delete(DeleteNotice {
                    status_id: id(kind, status, "id")?,
                    user_id: status.get("user_id").and_then(as_id),
                })
            }
            MessageKind::ScrubGeo => {
                let scrub = &value["scrub_geo"];
                Message::ScrubGeo(ScrubGeoNotice {
                    up_to_status_id: id(kind, scrub, "up_to_status_id")?,
                    user_id: scrub.get("user_id").and_then(as_id),
                })
            }
            MessageKind::Limit => Message::Limit(LimitNotice {
                track: id(kind, &value["limit"], "track")?,
            }),
            MessageKind::DirectMessage => {
                Message::DirectMessage(field(kind, &value["direct_message"])?)
            }
            MessageKind::StatusWithheld => {
                Message::StatusWithheld(field(kind, &value["status_withheld"])?)
            }
            MessageKind::UserWithheld => {
                Message::UserWithheld(field(kind, &value["user_withheld"])?)
            }
            MessageKind::NamedEvent(_) => Message::Event(field(kind, value)?),
            MessageKind::FriendsList => Message::Friends(field(kind, &value["friends"])?),
            MessageKind::TimelineStatus => Message::TimelineStatus(field(kind, value)?),
            MessageKind::ForUser => Message::ForUser(
                ForUserMessage::from_value(value)
                    .ok_or_else(|| malformed(kind, "for_user is not a string or number"))?,
            ),
            MessageKind::Unclassified => Message::Unclassified,
        };
        Ok(message)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Control { .. } => MessageKind::Control,
            Message::StallWarning(_) => MessageKind::StallWarning,
            Message::Delete(_) => MessageKind::Delete,
            Message::ScrubGeo(_) => MessageKind::ScrubGeo,
            Message::Limit(_) => MessageKind::Limit,
            Message::DirectMessage(_) => MessageKind::DirectMessage,
            Message::StatusWithheld(_) => MessageKind::StatusWithheld,
            Message::UserWithheld(_) => MessageKind::UserWithheld,
            Message::Event(event) => MessageKind::NamedEvent(event.event.clone()),
            Message::Friends(_) => MessageKind::FriendsList,
            Message::TimelineStatus(_) => MessageKind::TimelineStatus,
            Message::ForUser(_) => MessageKind::ForUser,
            Message::Unclassified => MessageKind::Unclassified,
        }
    }
}

fn malformed(kind: &MessageKind, reason: impl Into<String>) -> StreamError {
    StreamError::MalformedMessage {
        kind: kind.name().to_string(),
        reason: reason.into(),
    }
}

fn field<T: DeserializeOwned>(kind: &MessageKind, value: &Value) -> Result<T> {
    <T as serde::Deserialize>::deserialize(value).map_err(|e| malformed(kind, e.to_string()))
}

/// Ids arrive as numbers, occasionally as numeric strings
fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn id(kind: &MessageKind, value: &Value, key: &str) -> Result<u64> {
    value
        .get(key)
        .and_then(as_id)
        .ok_or_else(|| malformed(kind, format!("missing or invalid {}", key)))
}
