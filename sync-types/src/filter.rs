//! Sync filter definitions.
//!
//! A filter narrows which events the server returns from `/sync`. It is
//! uploaded once per user and referred to by the returned filter ID.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// `event_format` value for client-formatted events.
pub const EVENT_FORMAT_CLIENT: &str = "client";
/// `event_format` value for federation-formatted events.
pub const EVENT_FORMAT_FEDERATION: &str = "federation";

/// Top-level filter definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Filter for global account data
    #[serde(default)]
    pub account_data: FilterPart,
    /// Fields to include in returned events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_fields: Vec<String>,
    /// `client` or `federation`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_format: String,
    /// Filter for presence events
    #[serde(default)]
    pub presence: FilterPart,
    /// Filter for room events
    #[serde(default)]
    pub room: RoomFilter,
}

/// Filtering rules for room events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomFilter {
    /// Per-room account data
    #[serde(default)]
    pub account_data: FilterPart,
    /// Ephemeral events such as typing notifications
    #[serde(default)]
    pub ephemeral: FilterPart,
    /// Include rooms the user has left
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_leave: bool,
    /// Rooms to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_rooms: Vec<String>,
    /// Rooms to include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<String>,
    /// Room state events
    #[serde(default)]
    pub state: FilterPart,
    /// Room timeline events
    #[serde(default)]
    pub timeline: FilterPart,
}

/// Filtering rules for one category of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPart {
    /// Rooms to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_rooms: Vec<String>,
    /// Rooms to include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<String>,
    /// Maximum number of events to return (0 = server default)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub limit: u32,
    /// Senders to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_senders: Vec<String>,
    /// Event types to exclude
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_types: Vec<String>,
    /// Senders to include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub senders: Vec<String>,
    /// Event types to include
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Only events with (or without) a `url` content key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_url: Option<bool>,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl Filter {
    /// The filter the server applies when none is provided.
    pub fn server_default() -> Self {
        Self {
            account_data: FilterPart::server_default(),
            event_fields: Vec::new(),
            event_format: EVENT_FORMAT_CLIENT.to_string(),
            presence: FilterPart::server_default(),
            room: RoomFilter {
                account_data: FilterPart::server_default(),
                ephemeral: FilterPart::server_default(),
                include_leave: false,
                not_rooms: Vec::new(),
                rooms: Vec::new(),
                state: FilterPart::server_default(),
                timeline: FilterPart::server_default(),
            },
        }
    }

    /// Check that property values are ones the server accepts.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.event_format != EVENT_FORMAT_CLIENT && self.event_format != EVENT_FORMAT_FEDERATION
        {
            return Err(ProtocolError::InvalidFilter(format!(
                "bad event_format value {:?}, must be one of [\"{}\", \"{}\"]",
                self.event_format, EVENT_FORMAT_CLIENT, EVENT_FORMAT_FEDERATION
            )));
        }
        Ok(())
    }

    /// Convert to a JSON value suitable for uploading.
    pub fn to_json(&self) -> Result<serde_json::Value, ProtocolError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl FilterPart {
    /// The per-category defaults the server applies.
    pub fn server_default() -> Self {
        Self {
            limit: 20,
            ..Self::default()
        }
    }
}
