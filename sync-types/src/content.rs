//! Typed event content.
//!
//! Event content is carried as raw JSON on [`crate::Event`]; these structs
//! are the shapes callers most often decode it into.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Membership state event type.
pub const EVENT_MEMBER: &str = "m.room.member";
/// Room message event type.
pub const EVENT_MESSAGE: &str = "m.room.message";
/// Room tag event type.
pub const EVENT_TAG: &str = "m.tag";

/// Membership of a user in a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Membership {
    /// Joined the room
    Join,
    /// Invited to the room
    Invite,
    /// Left the room, or was never in it
    Leave,
    /// Banned from the room
    Ban,
    /// Asked to join the room
    Knock,
    /// A value this client does not know about
    Other(String),
}

impl Membership {
    /// The wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Membership::Join => "join",
            Membership::Invite => "invite",
            Membership::Leave => "leave",
            Membership::Ban => "ban",
            Membership::Knock => "knock",
            Membership::Other(other) => other,
        }
    }
}

impl From<&str> for Membership {
    fn from(value: &str) -> Self {
        match value {
            "join" => Membership::Join,
            "invite" => Membership::Invite,
            "leave" => Membership::Leave,
            "ban" => Membership::Ban,
            "knock" => Membership::Knock,
            other => Membership::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Membership {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Membership {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Membership::from(value.as_str()))
    }
}

/// Content of an `m.room.member` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberContent {
    /// The membership state
    pub membership: Membership,
    /// Display name, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    /// Avatar URL, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Content of an `m.text` or `m.notice` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    /// `m.text`, `m.notice` or `m.emote`
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    /// Plain text body
    pub body: String,
    /// Format of `formatted_body`, usually `org.matrix.custom.html`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Formatted body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_body: Option<String>,
}

impl TextMessage {
    /// Plain `m.text` message.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            msg_type: "m.text".to_string(),
            body: body.into(),
            format: None,
            formatted_body: None,
        }
    }

    /// Plain `m.notice` message.
    pub fn notice(body: impl Into<String>) -> Self {
        Self {
            msg_type: "m.notice".to_string(),
            ..Self::text(body)
        }
    }

    /// `m.text` message with an HTML formatted body.
    pub fn html(body: impl Into<String>, formatted_body: impl Into<String>) -> Self {
        Self {
            format: Some("org.matrix.custom.html".to_string()),
            formatted_body: Some(formatted_body.into()),
            ..Self::text(body)
        }
    }
}

/// Content of an `m.image` message referencing already-uploaded media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMessage {
    /// Always `m.image`
    #[serde(rename = "msgtype")]
    pub msg_type: String,
    /// Description of the image
    pub body: String,
    /// Content URI of the image
    pub url: String,
}

/// Content of an `m.tag` account data event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagContent {
    /// Tag name to properties
    pub tags: HashMap<String, TagProperties>,
}

/// Properties of a single room tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagProperties {
    /// Ordering hint in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn membership_parses_known_values() {
        assert_eq!(Membership::from("join"), Membership::Join);
        assert_eq!(Membership::from("ban"), Membership::Ban);
        assert_eq!(
            Membership::from("custom"),
            Membership::Other("custom".to_string())
        );
        assert_eq!(Membership::Leave.to_string(), "leave");
    }

    #[test]
    fn member_content_decodes() {
        let content: MemberContent = serde_json::from_value(json!({
            "membership": "invite",
            "displayname": "Alice"
        }))
        .unwrap();
        assert_eq!(content.membership, Membership::Invite);
        assert_eq!(content.displayname.as_deref(), Some("Alice"));
        assert!(content.avatar_url.is_none());
    }

    #[test]
    fn html_text_message_serializes_format() {
        let msg = TextMessage::html("hi", "<b>hi</b>");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["msgtype"], "m.text");
        assert_eq!(value["format"], "org.matrix.custom.html");
        assert_eq!(value["formatted_body"], "<b>hi</b>");
    }

    #[test]
    fn notice_omits_formatting() {
        let value = serde_json::to_value(TextMessage::notice("beep")).unwrap();
        assert_eq!(value, json!({ "msgtype": "m.notice", "body": "beep" }));
    }

    #[test]
    fn tag_order_is_optional() {
        let tags: TagContent = serde_json::from_value(json!({
            "tags": { "m.favourite": { "order": 0.5 }, "u.work": {} }
        }))
        .unwrap();
        assert_eq!(tags.tags["m.favourite"].order, Some(0.5));
        assert_eq!(tags.tags["u.work"].order, None);
    }
}
