//! Request payloads for the client-server API.

use serde::{Deserialize, Serialize};

use crate::Event;

/// Parameters of a long-poll `/sync` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// How long the server may hold the request open, in milliseconds
    pub timeout_ms: u64,
    /// Stream position to sync from (empty = initial sync)
    pub since: String,
    /// Filter ID to apply (empty = none)
    pub filter: String,
    /// Return the full state of every room
    pub full_state: bool,
    /// Presence to set while syncing (empty = leave unchanged)
    pub set_presence: String,
}

impl SyncRequest {
    /// A request from `since` using `filter`.
    pub fn new(timeout_ms: u64, since: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            timeout_ms,
            since: since.into(),
            filter: filter.into(),
            ..Self::default()
        }
    }

    /// Query parameters for this request. Empty values are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("timeout", self.timeout_ms.to_string())];
        if !self.since.is_empty() {
            query.push(("since", self.since.clone()));
        }
        if !self.filter.is_empty() {
            query.push(("filter", self.filter.clone()));
        }
        if !self.set_presence.is_empty() {
            query.push(("set_presence", self.set_presence.clone()));
        }
        if self.full_state {
            query.push(("full_state", "true".to_string()));
        }
        query
    }
}

/// Registration request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Desired localpart
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Bind the email to the account on the identity server
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bind_email: bool,
    /// Account password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Device ID to reuse
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_id: String,
    /// Display name for a newly created device
    #[serde(default)]
    pub initial_device_display_name: String,
    /// User-interactive authentication data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,
}

/// Identifies the user logging in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentifier {
    /// Identifier type, e.g. `m.id.user`
    #[serde(rename = "type")]
    pub id_type: String,
    /// Localpart or full user ID for `m.id.user`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl UserIdentifier {
    /// An `m.id.user` identifier.
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            id_type: "m.id.user".to_string(),
            user: Some(user.into()),
        }
    }
}

/// Login request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Login type, e.g. `m.login.password`
    #[serde(rename = "type")]
    pub login_type: String,
    /// Who is logging in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<UserIdentifier>,
    /// Password for `m.login.password`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Token for `m.login.token`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    /// Device ID to reuse
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_id: String,
    /// Display name for a newly created device
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub initial_device_display_name: String,
}

impl LoginRequest {
    /// Password login for the given user.
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login_type: "m.login.password".to_string(),
            identifier: Some(UserIdentifier::user(user)),
            password: password.into(),
            token: String::new(),
            device_id: String::new(),
            initial_device_display_name: String::new(),
        }
    }
}

/// Third-party invite used when creating a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite3pid {
    /// Identity server hostname
    pub id_server: String,
    /// Medium, e.g. `email`
    pub medium: String,
    /// Address within the medium
    pub address: String,
}

/// Room creation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    /// `public` or `private`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub visibility: String,
    /// Desired local alias
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_alias_name: String,
    /// Room name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Room topic
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// Users to invite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invite: Vec<String>,
    /// Third-party identifiers to invite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invite_3pid: Vec<Invite3pid>,
    /// Extra keys for the `m.room.create` content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_content: Option<serde_json::Value>,
    /// State events to send after creation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_state: Vec<Event>,
    /// `private_chat`, `trusted_private_chat` or `public_chat`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preset: String,
    /// Flag the room as a direct chat
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_direct: bool,
}

/// Redaction request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactRequest {
    /// Why the event is being redacted
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

/// Typing notification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingRequest {
    /// Whether the user is typing
    pub typing: bool,
    /// How long the notification is valid for, in milliseconds
    pub timeout: u64,
}
