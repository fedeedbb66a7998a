//! Callback registry keyed by event name
//!
//! Every event name holds at most one handler. Setting a handler replaces the
//! previous one; reading an unset name yields `None`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::callback::Callback;
use crate::control::ControlSession;
use crate::message::{
    DeleteNotice, DirectMessage, LimitNotice, ReconnectNotice, ScrubGeoNotice, StallWarning,
    Status, StatusWithheld, UserEvent, UserWithheld,
};

/// Name of a registrable event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Delete,
    ScrubGeo,
    Limit,
    Error,
    EnhanceYourCalm,
    Unauthorized,
    Reconnect,
    Inited,
    DirectMessage,
    TimelineStatus,
    Anything,
    NoDataReceived,
    StatusWithheld,
    UserWithheld,
    Control,
    Friends,
    StallWarning,
    /// A user-stream event such as `favorite`
    Event(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Delete => "delete",
            EventName::ScrubGeo => "scrub_geo",
            EventName::Limit => "limit",
            EventName::Error => "error",
            EventName::EnhanceYourCalm => "enhance_your_calm",
            EventName::Unauthorized => "unauthorized",
            EventName::Reconnect => "reconnect",
            EventName::Inited => "inited",
            EventName::DirectMessage => "direct_message",
            EventName::TimelineStatus => "timeline_status",
            EventName::Anything => "anything",
            EventName::NoDataReceived => "no_data_received",
            EventName::StatusWithheld => "status_withheld",
            EventName::UserWithheld => "user_withheld",
            EventName::Control => "control",
            EventName::Friends => "friends",
            EventName::StallWarning => "stall_warning",
            EventName::Event(name) => name,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = std::convert::Infallible;

    /// Fixed names map to their variant; anything else is a user-stream event
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "delete" => EventName::Delete,
            "scrub_geo" => EventName::ScrubGeo,
            "limit" => EventName::Limit,
            "error" => EventName::Error,
            "enhance_your_calm" => EventName::EnhanceYourCalm,
            "unauthorized" => EventName::Unauthorized,
            "reconnect" => EventName::Reconnect,
            "inited" => EventName::Inited,
            "direct_message" => EventName::DirectMessage,
            "timeline_status" => EventName::TimelineStatus,
            "anything" => EventName::Anything,
            "no_data_received" => EventName::NoDataReceived,
            "status_withheld" => EventName::StatusWithheld,
            "user_withheld" => EventName::UserWithheld,
            "control" => EventName::Control,
            "friends" => EventName::Friends,
            "stall_warning" => EventName::StallWarning,
            other => EventName::Event(other.to_string()),
        })
    }
}

/// Generates the setter, getter and name mapping for each fixed event
macro_rules! registry_slots {
    ($( $field:ident / $setter:ident : $payload:ty => $name:ident ),+ $(,)?) => {
        /// Handlers for one session, at most one per event name.
        #[derive(Clone, Default)]
        pub struct CallbackRegistry {
            $( $field: Option<Callback<$payload>>, )+
            events: HashMap<String, Callback<UserEvent>>,
        }

        impl CallbackRegistry {
            $(
                #[doc = concat!("Set the `", stringify!($field), "` handler, replacing any previous one")]
                pub fn $setter(&mut self, callback: Callback<$payload>) -> &mut Self {
                    self.$field = Some(callback);
                    self
                }

                pub fn $field(&self) -> Option<&Callback<$payload>> {
                    self.$field.as_ref()
                }
            )+

            /// Whether a handler is registered under `name`
            pub fn is_set(&self, name: &EventName) -> bool {
                match name {
                    $( EventName::$name => self.$field.is_some(), )+
                    EventName::Event(event) => self.events.contains_key(event),
                }
            }

            /// Remove the handler registered under `name`
            pub fn clear(&mut self, name: &EventName) -> &mut Self {
                match name {
                    $( EventName::$name => self.$field = None, )+
                    EventName::Event(event) => {
                        self.events.remove(event);
                    }
                }
                self
            }

            /// A copy of `self` with every handler set in `overrides` taking
            /// precedence
            pub fn merged(&self, overrides: &CallbackRegistry) -> CallbackRegistry {
                let mut merged = self.clone();
                $(
                    if let Some(callback) = &overrides.$field {
                        merged.$field = Some(callback.clone());
                    }
                )+
                merged.events.extend(
                    overrides.events.iter().map(|(name, cb)| (name.clone(), cb.clone())),
                );
                merged
            }

            /// Names of every registered handler
            pub fn registered(&self) -> Vec<EventName> {
                let mut names = Vec::new();
                $(
                    if self.$field.is_some() {
                        names.push(EventName::$name);
                    }
                )+
                let mut events: Vec<_> = self.events.keys().cloned().collect();
                events.sort();
                names.extend(events.into_iter().map(EventName::Event));
                names
            }
        }
    };
}

registry_slots! {
    delete / on_delete: DeleteNotice => Delete,
    scrub_geo / on_scrub_geo: ScrubGeoNotice => ScrubGeo,
    limit / on_limit: LimitNotice => Limit,
    error / on_error: String => Error,
    enhance_your_calm / on_enhance_your_calm: () => EnhanceYourCalm,
    unauthorized / on_unauthorized: () => Unauthorized,
    reconnect / on_reconnect: ReconnectNotice => Reconnect,
    inited / on_inited: () => Inited,
    direct_message / on_direct_message: DirectMessage => DirectMessage,
    timeline_status / on_timeline_status: Status => TimelineStatus,
    anything / on_anything: Value => Anything,
    no_data_received / on_no_data_received: () => NoDataReceived,
    status_withheld / on_status_withheld: StatusWithheld => StatusWithheld,
    user_withheld / on_user_withheld: UserWithheld => UserWithheld,
    control / on_control: ControlSession => Control,
    friends / on_friends: Vec<u64> => Friends,
    stall_warning / on_stall_warning: StallWarning => StallWarning,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handler for a named user-stream event, e.g. `favorite`
    pub fn on_event(&mut self, name: impl Into<String>, callback: Callback<UserEvent>) -> &mut Self {
        self.events.insert(name.into(), callback);
        self
    }

    pub fn event(&self, name: &str) -> Option<&Callback<UserEvent>> {
        self.events.get(name)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}
