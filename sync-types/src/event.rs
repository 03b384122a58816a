//! Room events.
//!
//! An [`Event`] is one unit of room activity: a message, a state change,
//! a typing notification. Content is kept as an untyped JSON map; typed
//! accessors fail explicitly when the shape is not what the caller expects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::content::Membership;
use crate::{ContentError, ProtocolError};

/// JSON object map used for event content.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A single event in a room.
///
/// An event with a `state_key` is a state event; at most one state event
/// per `(event_type, state_key)` pair is current in a room.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    /// The state key, present only on state events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    /// User ID of the sender
    #[serde(default)]
    pub sender: String,
    /// Event type, e.g. `m.room.message`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Origin server timestamp in milliseconds
    #[serde(rename = "origin_server_ts", default)]
    pub timestamp: i64,
    /// Server-assigned event ID
    #[serde(rename = "event_id", default)]
    pub id: String,
    /// Room the event belongs to. Not sent inside sync responses; filled in
    /// while the response is processed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_id: String,
    /// Event ID this event redacts, if it is a redaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,
    /// Unsigned server-side data
    #[serde(default, skip_serializing_if = "JsonMap::is_empty")]
    pub unsigned: JsonMap,
    /// The event content
    #[serde(default)]
    pub content: JsonMap,
    /// Previous content of a state event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_content: Option<JsonMap>,
}

impl Event {
    /// Create an event with the given type and content.
    pub fn new(event_type: impl Into<String>, content: JsonMap) -> Self {
        Self {
            event_type: event_type.into(),
            content,
            ..Self::default()
        }
    }

    /// Create a state event with the given type, state key and content.
    pub fn new_state(
        event_type: impl Into<String>,
        state_key: impl Into<String>,
        content: JsonMap,
    ) -> Self {
        Self {
            state_key: Some(state_key.into()),
            ..Self::new(event_type, content)
        }
    }

    /// Set the sender (builder style).
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Set the event ID (builder style).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// True if this is a state event.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// Read a string field from the content.
    pub fn content_str(&self, field: &str) -> Result<&str, ContentError> {
        match self.content.get(field) {
            None => Err(ContentError::Missing {
                field: field.to_string(),
            }),
            Some(value) => value.as_str().ok_or_else(|| ContentError::WrongType {
                field: field.to_string(),
                expected: "string",
            }),
        }
    }

    /// The `body` of a message event.
    pub fn body(&self) -> Result<&str, ContentError> {
        self.content_str("body")
    }

    /// The `msgtype` of a message event.
    pub fn message_type(&self) -> Result<&str, ContentError> {
        self.content_str("msgtype")
    }

    /// The `membership` of an `m.room.member` event.
    pub fn membership(&self) -> Result<Membership, ContentError> {
        self.content_str("membership").map(Membership::from)
    }

    /// Deserialize the content into a typed struct.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let value = serde_json::Value::Object(self.content.clone());
        Ok(serde_json::from_value(value)?)
    }
}
