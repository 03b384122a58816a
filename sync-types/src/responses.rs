//! Response payloads from the client-server API.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Event;

/// Standard JSON error body returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code, e.g. `M_FORBIDDEN`
    #[serde(rename = "errcode")]
    pub code: String,
    /// Human-readable message
    #[serde(rename = "error", default)]
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Response to filter upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFilterResponse {
    /// The server-assigned filter ID
    pub filter_id: String,
}

/// Supported protocol versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionsResponse {
    /// Version strings
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Successful registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Access token for the new account
    #[serde(default)]
    pub access_token: String,
    /// Device ID
    #[serde(default)]
    pub device_id: String,
    /// Homeserver name
    #[serde(default)]
    pub home_server: String,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: String,
    /// Full user ID
    #[serde(default)]
    pub user_id: String,
}

/// One user-interactive authentication flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFlow {
    /// Stage types that make up the flow
    #[serde(default)]
    pub stages: Vec<String>,
}

/// A 401 response asking for user-interactive authentication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInteractiveResponse {
    /// Available flows
    #[serde(default)]
    pub flows: Vec<AuthFlow>,
    /// Stage parameters
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Session to continue
    #[serde(default)]
    pub session: String,
    /// Stages already completed
    #[serde(default)]
    pub completed: Vec<String>,
    /// Error code, if a stage failed
    #[serde(default)]
    pub errcode: String,
    /// Error message, if a stage failed
    #[serde(default)]
    pub error: String,
}

impl UserInteractiveResponse {
    /// True if some flow consists of exactly the given single stage.
    pub fn has_single_stage_flow(&self, stage: &str) -> bool {
        self.flows
            .iter()
            .any(|flow| flow.stages.len() == 1 && flow.stages[0] == stage)
    }
}

/// Base URL of a discovered server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBaseUrl {
    /// The base URL
    #[serde(default)]
    pub base_url: String,
}

/// Server discovery information returned with a login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInformation {
    /// Homeserver to use from now on
    #[serde(rename = "m.homeserver", default)]
    pub homeserver: ServerBaseUrl,
    /// Identity server, if any
    #[serde(rename = "m.identity_server", default)]
    pub identity_server: ServerBaseUrl,
}

/// Successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Access token
    pub access_token: String,
    /// Device ID
    #[serde(default)]
    pub device_id: String,
    /// Homeserver name
    #[serde(default)]
    pub home_server: String,
    /// Full user ID
    pub user_id: String,
    /// Discovery information
    #[serde(default)]
    pub well_known: DiscoveryInformation,
}

/// Room creation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    /// ID of the new room
    pub room_id: String,
}

/// Result of sending an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEventResponse {
    /// ID of the new event
    pub event_id: String,
}

/// Rooms the user is joined to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedRoomsResponse {
    /// Room IDs
    #[serde(default)]
    pub joined_rooms: Vec<String>,
}

/// A page of room history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Pagination token at the start of the chunk
    #[serde(default)]
    pub start: String,
    /// The events
    #[serde(default)]
    pub chunk: Vec<Event>,
    /// Pagination token at the end of the chunk
    #[serde(default)]
    pub end: String,
}

/// A plain list of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventList {
    /// The events
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Timeline section of a room in a sync response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Events, oldest first
    #[serde(default)]
    pub events: Vec<Event>,
    /// True if the server dropped events between the previous batch and this one
    #[serde(default)]
    pub limited: bool,
    /// Token to paginate backwards from
    #[serde(default)]
    pub prev_batch: String,
}

/// A room the user is joined to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinedRoom {
    /// State changes before the timeline
    #[serde(default)]
    pub state: EventList,
    /// New timeline events
    #[serde(default)]
    pub timeline: Timeline,
    /// Typing notifications, receipts and similar
    #[serde(default)]
    pub ephemeral: EventList,
}

/// A room the user is invited to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvitedRoom {
    /// Stripped state describing the room
    #[serde(default)]
    pub invite_state: EventList,
}

/// A room the user has left.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeftRoom {
    /// State changes before the timeline
    #[serde(default)]
    pub state: EventList,
    /// Timeline up to the leave
    #[serde(default)]
    pub timeline: Timeline,
}

/// Rooms in a sync response, bucketed by membership.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rooms {
    /// Joined rooms by room ID
    #[serde(default)]
    pub join: BTreeMap<String, JoinedRoom>,
    /// Invited rooms by room ID
    #[serde(default)]
    pub invite: BTreeMap<String, InvitedRoom>,
    /// Left rooms by room ID
    #[serde(default)]
    pub leave: BTreeMap<String, LeftRoom>,
}

/// One incremental update batch from `/sync`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Stream position to sync from next
    pub next_batch: String,
    /// Global account data
    #[serde(default)]
    pub account_data: EventList,
    /// Presence updates
    #[serde(default)]
    pub presence: EventList,
    /// Per-room updates
    #[serde(default)]
    pub rooms: Rooms,
}

impl SyncResponse {
    /// An empty response advancing to `next_batch`.
    pub fn new(next_batch: impl Into<String>) -> Self {
        Self {
            next_batch: next_batch.into(),
            ..Self::default()
        }
    }
}
