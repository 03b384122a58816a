//! Persistence port for sync state.
//!
//! A [`Storer`] remembers, per user, the last stream position and the
//! uploaded filter ID, and keeps room snapshots by room ID. The sync loop is
//! the only caller; implementations need not support concurrent use from
//! other tasks while a loop is running.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::Room;

/// Storage backend for sync state.
///
/// Write your own to persist across restarts, or use [`MemoryStore`].
///
/// Methods are called inline on the sync loop, once per batch for the
/// position and once per state event for rooms. They should be quick;
/// blocking I/O here stalls the loop's task.
pub trait Storer: Send + Sync {
    /// Remember the filter ID uploaded for `user_id`.
    fn save_filter_id(&self, user_id: &str, filter_id: &str);

    /// The filter ID uploaded for `user_id`, if any.
    fn load_filter_id(&self, user_id: &str) -> Option<String>;

    /// Remember the stream position to sync from next.
    fn save_next_batch(&self, user_id: &str, next_batch: &str);

    /// The stream position to sync from, or `None` for an initial sync.
    fn load_next_batch(&self, user_id: &str) -> Option<String>;

    /// Store a room snapshot, replacing any previous one with the same ID.
    fn save_room(&self, room: &Room);

    /// The stored snapshot of `room_id`, if any.
    fn load_room(&self, room_id: &str) -> Option<Room>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    filters: HashMap<String, String>,
    next_batch: HashMap<String, String>,
    rooms: HashMap<String, Room>,
}

/// In-memory store.
///
/// Everything is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms stored.
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        // A listener panic never happens while this lock is held, so the data
        // is consistent even if the mutex was poisoned elsewhere.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storer for MemoryStore {
    fn save_filter_id(&self, user_id: &str, filter_id: &str) {
        self.lock()
            .filters
            .insert(user_id.to_string(), filter_id.to_string());
    }

    fn load_filter_id(&self, user_id: &str) -> Option<String> {
        self.lock().filters.get(user_id).cloned()
    }

    fn save_next_batch(&self, user_id: &str, next_batch: &str) {
        self.lock()
            .next_batch
            .insert(user_id.to_string(), next_batch.to_string());
    }

    fn load_next_batch(&self, user_id: &str) -> Option<String> {
        self.lock().next_batch.get(user_id).cloned()
    }

    fn save_room(&self, room: &Room) {
        self.lock().rooms.insert(room.id.clone(), room.clone());
    }

    fn load_room(&self, room_id: &str) -> Option<Room> {
        self.lock().rooms.get(room_id).cloned()
    }
}
