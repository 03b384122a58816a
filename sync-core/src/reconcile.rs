//! Sync response reconciliation.
//!
//! [`Reconciler::process`] takes one `/sync` response and:
//! 1. discards it entirely if it answers an initial sync (`since` empty),
//! 2. drops rooms the syncing user has just (re)joined, see
//!    [`suppress_rejoined_rooms`],
//! 3. applies state events to the stored rooms and notifies listeners, in
//!    the order joined → invited → left.
//!
//! State is always updated and saved before listeners for the same event
//! are notified, so a listener looking up room state sees the change.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use roomsync_types::{Event, Membership, SyncResponse, EVENT_MEMBER};
use thiserror::Error;

use crate::{ListenerRegistry, Room, RoomError, Storer};

/// A sync response could not be processed. Fatal to the sync loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// A state section held an event that cannot be stored as state.
    #[error(
        "failed to process sync response: user_id={user_id} since={since} room_id={room_id}: {source}"
    )]
    InvalidStateEvent {
        /// The syncing user.
        user_id: String,
        /// The stream position the response was requested from.
        since: String,
        /// Room the event arrived in.
        room_id: String,
        /// Why the event was rejected.
        #[source]
        source: RoomError,
    },

    /// A listener panicked.
    #[error("listener panicked while processing sync response: user_id={user_id} since={since} panic={message}")]
    ListenerPanicked {
        /// The syncing user.
        user_id: String,
        /// The stream position the response was requested from.
        since: String,
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl ReconcileError {
    /// The syncing user.
    pub fn user_id(&self) -> &str {
        match self {
            Self::InvalidStateEvent { user_id, .. } | Self::ListenerPanicked { user_id, .. } => {
                user_id
            }
        }
    }

    /// The stream position the failed response was requested from.
    pub fn since(&self) -> &str {
        match self {
            Self::InvalidStateEvent { since, .. } | Self::ListenerPanicked { since, .. } => since,
        }
    }
}

/// Remove joined rooms whose timeline contains the syncing user's own join.
///
/// The server sends the most recent timeline chunk of a room as soon as it is
/// joined. Those events may already have been processed before an earlier
/// leave, so the whole room is dropped from the joined and invited buckets.
/// Messages that follow the join in the same chunk are dropped with it.
///
/// Returns the IDs of the removed rooms.
pub fn suppress_rejoined_rooms(user_id: &str, response: &mut SyncResponse) -> Vec<String> {
    let rejoined: Vec<String> = response
        .rooms
        .join
        .iter()
        .filter(|(_, room)| {
            room.timeline
                .events
                .iter()
                .rev()
                .any(|event| is_own_join(user_id, event))
        })
        .map(|(room_id, _)| room_id.clone())
        .collect();

    for room_id in &rejoined {
        response.rooms.join.remove(room_id);
        response.rooms.invite.remove(room_id);
    }
    rejoined
}

fn is_own_join(user_id: &str, event: &Event) -> bool {
    event.event_type == EVENT_MEMBER
        && event.state_key.as_deref() == Some(user_id)
        && event.membership() == Ok(Membership::Join)
}

/// Applies sync responses to stored rooms and notifies listeners.
pub struct Reconciler {
    user_id: String,
    store: Arc<dyn Storer>,
    listeners: ListenerRegistry,
}

impl Reconciler {
    /// Create a reconciler for `user_id` backed by `store`.
    pub fn new(user_id: impl Into<String>, store: Arc<dyn Storer>) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            listeners: ListenerRegistry::new(),
        }
    }

    /// The syncing user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn Storer> {
        &self.store
    }

    /// Register a listener for `event_type`. See [`ListenerRegistry::on_event_type`].
    pub fn on_event_type<F>(&mut self, event_type: impl Into<String>, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners.on_event_type(event_type, callback);
    }

    /// The registered listeners.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Process one response. `since` is the stream position the response was
    /// requested from.
    ///
    /// Panics raised by listeners are caught and returned as
    /// [`ReconcileError::ListenerPanicked`].
    pub fn process(&self, mut response: SyncResponse, since: &str) -> Result<(), ReconcileError> {
        if since.is_empty() {
            return Ok(());
        }
        suppress_rejoined_rooms(&self.user_id, &mut response);

        match panic::catch_unwind(AssertUnwindSafe(|| self.apply(response, since))) {
            Ok(result) => result,
            Err(payload) => Err(ReconcileError::ListenerPanicked {
                user_id: self.user_id.clone(),
                since: since.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn apply(&self, response: SyncResponse, since: &str) -> Result<(), ReconcileError> {
        let rooms = response.rooms;

        for (room_id, joined) in rooms.join {
            let mut room = self.get_or_create_room(&room_id);
            for event in joined.state.events {
                let event = self.update_state(&mut room, event, since)?;
                self.listeners.dispatch(&event);
            }
            for event in joined.timeline.events {
                self.listeners.dispatch(&in_room(event, &room_id));
            }
            for event in joined.ephemeral.events {
                self.listeners.dispatch(&in_room(event, &room_id));
            }
        }

        for (room_id, invited) in rooms.invite {
            let mut room = self.get_or_create_room(&room_id);
            for event in invited.invite_state.events {
                let event = self.update_state(&mut room, event, since)?;
                self.listeners.dispatch(&event);
            }
        }

        for (room_id, left) in rooms.leave {
            let mut room = self.get_or_create_room(&room_id);
            // Only membership-relevant entries; the rest is ordinary history.
            for event in left.timeline.events.into_iter().filter(Event::is_state) {
                let event = self.update_state(&mut room, event, since)?;
                self.listeners.dispatch(&event);
            }
        }

        Ok(())
    }

    fn get_or_create_room(&self, room_id: &str) -> Room {
        self.store.load_room(room_id).unwrap_or_else(|| {
            let room = Room::new(room_id);
            self.store.save_room(&room);
            room
        })
    }

    fn update_state(&self, room: &mut Room, event: Event, since: &str) -> Result<Event, ReconcileError> {
        let event = in_room(event, &room.id);
        room.update_state(event.clone())
            .map_err(|source| ReconcileError::InvalidStateEvent {
                user_id: self.user_id.clone(),
                since: since.to_string(),
                room_id: room.id.clone(),
                source,
            })?;
        self.store.save_room(room);
        Ok(event)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("user_id", &self.user_id)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

fn in_room(mut event: Event, room_id: &str) -> Event {
    event.room_id = room_id.to_string();
    event
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use roomsync_types::{InvitedRoom, JoinedRoom, JsonMap, LeftRoom, EVENT_MESSAGE};
    use serde_json::json;
    use std::sync::Mutex;

    const ME: &str = "@me:x";

    fn content(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn member(user: &str, membership: &str) -> Event {
        Event::new_state(EVENT_MEMBER, user, content(json!({ "membership": membership })))
            .with_sender(user)
    }

    fn message(body: &str) -> Event {
        Event::new(EVENT_MESSAGE, content(json!({ "msgtype": "m.text", "body": body })))
            .with_sender("@other:x")
    }

    fn joined(state: Vec<Event>, timeline: Vec<Event>) -> JoinedRoom {
        let mut room = JoinedRoom::default();
        room.state.events = state;
        room.timeline.events = timeline;
        room
    }

    /// Records `(event type, room id, body or state key)` for every dispatch.
    fn recording_reconciler(store: Arc<MemoryStore>) -> (Reconciler, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut reconciler = Reconciler::new(ME, store);
        for event_type in [EVENT_MEMBER, EVENT_MESSAGE, "m.typing", "m.room.topic"] {
            let seen = Arc::clone(&seen);
            reconciler.on_event_type(event_type, move |event: &Event| {
                let detail = event
                    .body()
                    .map(str::to_string)
                    .unwrap_or_else(|_| event.state_key.clone().unwrap_or_default());
                seen.lock()
                    .unwrap()
                    .push(format!("{} {} {}", event.event_type, event.room_id, detail));
            });
        }
        (reconciler, seen)
    }

    // ===========================================
    // Initial Sync Tests
    // ===========================================

    #[test]
    fn initial_sync_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, seen) = recording_reconciler(Arc::clone(&store));

        let mut response = SyncResponse::new("s1");
        response.rooms.join.insert(
            "!a:x".into(),
            joined(vec![member("@b:x", "join")], vec![message("old")]),
        );
        response
            .rooms
            .leave
            .insert("!c:x".into(), LeftRoom::default());

        reconciler.process(response, "").unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.room_count(), 0);
    }

    // ===========================================
    // Joined Room Tests
    // ===========================================

    #[test]
    fn joined_room_updates_state_and_notifies_in_order() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, seen) = recording_reconciler(Arc::clone(&store));

        let mut room = joined(vec![member("@b:x", "join")], vec![message("hello")]);
        room.ephemeral.events = vec![Event::new("m.typing", JsonMap::new())];
        let mut response = SyncResponse::new("s2");
        response.rooms.join.insert("!a:x".into(), room);

        reconciler.process(response, "s1").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "m.room.member !a:x @b:x",
                "m.room.message !a:x hello",
                "m.typing !a:x ",
            ]
        );
        let stored = store.load_room("!a:x").unwrap();
        assert_eq!(stored.membership_state("@b:x"), Membership::Join);
        // Timeline events never touch the state table
        assert!(stored.state.get(EVENT_MESSAGE).is_none());
    }

    #[test]
    fn state_is_saved_before_listener_runs() {
        let store = Arc::new(MemoryStore::new());
        let observed = Arc::new(Mutex::new(None));
        let mut reconciler = Reconciler::new(ME, Arc::clone(&store) as Arc<dyn Storer>);
        {
            let store = Arc::clone(&store);
            let observed = Arc::clone(&observed);
            reconciler.on_event_type(EVENT_MEMBER, move |event: &Event| {
                let room = store.load_room(&event.room_id).unwrap();
                *observed.lock().unwrap() =
                    Some(room.membership_state(event.state_key.as_deref().unwrap()));
            });
        }

        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![member("@b:x", "ban")], vec![]));
        reconciler.process(response, "s1").unwrap();

        assert_eq!(*observed.lock().unwrap(), Some(Membership::Ban));
    }

    #[test]
    fn repeated_state_event_clobbers() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, _) = recording_reconciler(Arc::clone(&store));

        let mut response = SyncResponse::new("s2");
        response.rooms.join.insert(
            "!a:x".into(),
            joined(
                vec![
                    member("@a:x", "invite").with_id("$first"),
                    member("@a:x", "join").with_id("$second"),
                ],
                vec![],
            ),
        );
        reconciler.process(response, "s1").unwrap();

        let room = store.load_room("!a:x").unwrap();
        assert_eq!(room.state[EVENT_MEMBER].len(), 1);
        assert_eq!(room.state_event(EVENT_MEMBER, "@a:x").unwrap().id, "$second");
    }

    #[test]
    fn existing_room_is_reused() {
        let store = Arc::new(MemoryStore::new());
        let mut existing = Room::new("!a:x");
        existing
            .update_state(Event::new_state("m.room.topic", "", content(json!({ "topic": "t" }))))
            .unwrap();
        store.save_room(&existing);
        let (reconciler, _) = recording_reconciler(Arc::clone(&store));

        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![member("@b:x", "join")], vec![]));
        reconciler.process(response, "s1").unwrap();

        let room = store.load_room("!a:x").unwrap();
        assert!(room.state_event("m.room.topic", "").is_some());
        assert_eq!(room.membership_state("@b:x"), Membership::Join);
    }

    // ===========================================
    // Invited / Left Room Tests
    // ===========================================

    #[test]
    fn invite_state_is_applied() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, seen) = recording_reconciler(Arc::clone(&store));

        let mut invited = InvitedRoom::default();
        invited.invite_state.events = vec![member(ME, "invite")];
        let mut response = SyncResponse::new("s2");
        response.rooms.invite.insert("!i:x".into(), invited);
        reconciler.process(response, "s1").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["m.room.member !i:x @me:x"]);
        let room = store.load_room("!i:x").unwrap();
        assert_eq!(room.membership_state(ME), Membership::Invite);
    }

    #[test]
    fn left_room_only_processes_state_events() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, seen) = recording_reconciler(Arc::clone(&store));

        let mut left = LeftRoom::default();
        left.timeline.events = vec![message("bye everyone"), member(ME, "leave")];
        let mut response = SyncResponse::new("s2");
        response.rooms.leave.insert("!l:x".into(), left);
        reconciler.process(response, "s1").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["m.room.member !l:x @me:x"]);
        let room = store.load_room("!l:x").unwrap();
        assert_eq!(room.membership_state(ME), Membership::Leave);
        assert!(room.state_event(EVENT_MEMBER, ME).is_some());
        assert!(room.state.get(EVENT_MESSAGE).is_none());
    }

    #[test]
    fn buckets_are_processed_joined_invited_left() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, seen) = recording_reconciler(Arc::clone(&store));

        let mut left = LeftRoom::default();
        left.timeline.events = vec![member("@l:x", "leave")];
        let mut invited = InvitedRoom::default();
        invited.invite_state.events = vec![member("@i:x", "invite")];

        let mut response = SyncResponse::new("s2");
        // Room IDs chosen so that alphabetical order differs from bucket order
        response.rooms.leave.insert("!a:x".into(), left);
        response.rooms.invite.insert("!b:x".into(), invited);
        response
            .rooms
            .join
            .insert("!c:x".into(), joined(vec![], vec![message("m")]));
        reconciler.process(response, "s1").unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "m.room.message !c:x m",
                "m.room.member !b:x @i:x",
                "m.room.member !a:x @l:x",
            ]
        );
    }

    // ===========================================
    // Join-Race Suppression Tests
    // ===========================================

    #[test]
    fn own_join_suppresses_room() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, seen) = recording_reconciler(Arc::clone(&store));

        let mut response = SyncResponse::new("s2");
        response.rooms.join.insert(
            "!a:x".into(),
            joined(
                vec![member("@b:x", "join")],
                vec![message("old 1"), message("old 2"), member(ME, "join")],
            ),
        );
        let mut invited = InvitedRoom::default();
        invited.invite_state.events = vec![member(ME, "invite")];
        response.rooms.invite.insert("!a:x".into(), invited);

        reconciler.process(response, "s1").unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert!(store.load_room("!a:x").is_none());
    }

    #[test]
    fn suppression_removes_room_from_both_buckets() {
        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![], vec![member(ME, "join")]));
        response
            .rooms
            .join
            .insert("!b:x".into(), joined(vec![], vec![message("keep")]));
        response
            .rooms
            .invite
            .insert("!a:x".into(), InvitedRoom::default());

        let removed = suppress_rejoined_rooms(ME, &mut response);

        assert_eq!(removed, vec!["!a:x".to_string()]);
        assert!(!response.rooms.join.contains_key("!a:x"));
        assert!(!response.rooms.invite.contains_key("!a:x"));
        assert!(response.rooms.join.contains_key("!b:x"));
    }

    #[test]
    fn messages_after_own_join_are_suppressed_too() {
        // Known limitation: the whole room is dropped, including messages
        // sent after the join within the same chunk.
        let mut response = SyncResponse::new("s2");
        response.rooms.join.insert(
            "!a:x".into(),
            joined(vec![], vec![member(ME, "join"), message("new after join")]),
        );

        let removed = suppress_rejoined_rooms(ME, &mut response);

        assert_eq!(removed, vec!["!a:x".to_string()]);
        assert!(response.rooms.join.is_empty());
    }

    #[test]
    fn other_users_join_does_not_suppress() {
        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![], vec![member("@b:x", "join")]));

        assert!(suppress_rejoined_rooms(ME, &mut response).is_empty());
        assert!(response.rooms.join.contains_key("!a:x"));
    }

    #[test]
    fn own_non_join_membership_does_not_suppress() {
        let mut response = SyncResponse::new("s2");
        let odd = Event::new_state(EVENT_MEMBER, ME, content(json!({ "membership": 5 })));
        response.rooms.join.insert(
            "!a:x".into(),
            joined(vec![], vec![member(ME, "invite"), odd]),
        );

        assert!(suppress_rejoined_rooms(ME, &mut response).is_empty());
    }

    #[test]
    fn own_join_in_state_section_does_not_suppress() {
        // Only the timeline is scanned
        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![member(ME, "join")], vec![]));

        assert!(suppress_rejoined_rooms(ME, &mut response).is_empty());
    }

    // ===========================================
    // Failure Tests
    // ===========================================

    #[test]
    fn listener_panic_becomes_error() {
        let store = Arc::new(MemoryStore::new());
        let mut reconciler = Reconciler::new(ME, store);
        reconciler.on_event_type(EVENT_MESSAGE, |_: &Event| panic!("listener exploded"));

        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![], vec![message("boom")]));

        let err = reconciler.process(response, "s1").unwrap_err();
        assert_eq!(
            err,
            ReconcileError::ListenerPanicked {
                user_id: ME.to_string(),
                since: "s1".to_string(),
                message: "listener exploded".to_string(),
            }
        );
        assert_eq!(err.user_id(), ME);
        assert_eq!(err.since(), "s1");
    }

    #[test]
    fn formatted_panic_message_is_captured() {
        let mut reconciler = Reconciler::new(ME, Arc::new(MemoryStore::new()));
        reconciler.on_event_type(EVENT_MESSAGE, |event: &Event| {
            panic!("bad event {}", event.room_id)
        });

        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![], vec![message("boom")]));

        match reconciler.process(response, "s1") {
            Err(ReconcileError::ListenerPanicked { message, .. }) => {
                assert_eq!(message, "bad event !a:x")
            }
            other => panic!("expected ListenerPanicked, got {:?}", other),
        }
    }

    #[test]
    fn state_event_without_state_key_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (reconciler, seen) = recording_reconciler(Arc::clone(&store));

        let mut response = SyncResponse::new("s2");
        response
            .rooms
            .join
            .insert("!a:x".into(), joined(vec![message("not state")], vec![]));

        let err = reconciler.process(response, "s1").unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::InvalidStateEvent { ref room_id, .. } if room_id == "!a:x"
        ));
        assert!(err.to_string().contains("user_id=@me:x since=s1"));
        assert!(seen.lock().unwrap().is_empty());
    }
}
