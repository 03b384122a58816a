//! # roomsync-types
//!
//! Wire format types for the roomsync chat client.
//!
//! This crate provides the foundational types used across all roomsync crates:
//! - [`Event`] - A single unit of room activity with polymorphic JSON content
//! - [`SyncRequest`] / [`SyncResponse`] - The long-poll sync exchange
//! - [`Filter`] - Server-side filtering definitions
//! - Request and response payloads for the client-server API
//! - [`ProtocolError`] / [`ContentError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod content;
mod error;
mod event;
mod filter;
mod requests;
mod responses;

pub use content::{
    ImageMessage, Membership, MemberContent, TagContent, TagProperties, TextMessage,
    EVENT_MEMBER, EVENT_MESSAGE, EVENT_TAG,
};
pub use error::{ContentError, ProtocolError};
pub use event::{Event, JsonMap};
pub use filter::{Filter, FilterPart, RoomFilter, EVENT_FORMAT_CLIENT, EVENT_FORMAT_FEDERATION};
pub use requests::{
    CreateRoomRequest, Invite3pid, LoginRequest, RedactRequest, RegisterRequest, SyncRequest,
    TypingRequest, UserIdentifier,
};
pub use responses::{
    ApiError, AuthFlow, CreateFilterResponse, CreateRoomResponse, DiscoveryInformation, EventList,
    InvitedRoom, JoinedRoom, JoinedRoomsResponse, LeftRoom, LoginResponse, MessagesResponse,
    RegisterResponse, Rooms, SendEventResponse, ServerBaseUrl, SyncResponse, Timeline,
    UserInteractiveResponse, VersionsResponse,
};
