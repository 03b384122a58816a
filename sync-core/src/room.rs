//! Per-room current state.
//!
//! A [`Room`] maps `(event type, state key)` to the latest state event seen
//! for that pair. Updates clobber; nothing is ever merged.

use std::collections::HashMap;

use roomsync_types::{Event, Membership, EVENT_MEMBER};
use thiserror::Error;

/// Errors from room state updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    /// Only state events can be stored in the state table.
    #[error("event of type {event_type} has no state key")]
    NotAStateEvent {
        /// Type of the rejected event.
        event_type: String,
    },
}

/// A single room and its current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Room {
    /// The room ID.
    pub id: String,
    /// Event type to state key to the current event.
    pub state: HashMap<String, HashMap<String, Event>>,
}

impl Room {
    /// Create an empty room.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: HashMap::new(),
        }
    }

    /// Replace the current state entry for the event's type and state key.
    pub fn update_state(&mut self, event: Event) -> Result<(), RoomError> {
        let state_key = event
            .state_key
            .clone()
            .ok_or_else(|| RoomError::NotAStateEvent {
                event_type: event.event_type.clone(),
            })?;
        self.state
            .entry(event.event_type.clone())
            .or_default()
            .insert(state_key, event);
        Ok(())
    }

    /// The current state event for the given type and state key.
    pub fn state_event(&self, event_type: &str, state_key: &str) -> Option<&Event> {
        self.state.get(event_type)?.get(state_key)
    }

    /// Membership of `user_id` in this room.
    ///
    /// Returns [`Membership::Leave`] when there is no membership entry for the
    /// user, or the entry has no string `membership` field. "Never seen" and
    /// "left" are not distinguished.
    pub fn membership_state(&self, user_id: &str) -> Membership {
        self.state_event(EVENT_MEMBER, user_id)
            .and_then(|event| event.membership().ok())
            .unwrap_or(Membership::Leave)
    }
}
