//! File-backed sync state.
//!
//! Filter IDs and stream positions are written to `state.json` on every
//! change so `listen` resumes where it left off. Room snapshots are kept in
//! memory only; they are rebuilt from state events as the sync continues.

use anyhow::{Context, Result};
use roomsync_core::{Room, Storer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    filter_ids: BTreeMap<String, String>,
    #[serde(default)]
    next_batch: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct FileStoreInner {
    persisted: PersistedState,
    rooms: HashMap<String, Room>,
}

/// [`Storer`] persisting sync tokens to a JSON file.
///
/// Saves write the file synchronously on the sync loop's task. The file only
/// holds a few tokens, so the write is short.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<FileStoreInner>,
}

impl FileStore {
    /// Open the state file at `path`, starting empty if it does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        let persisted = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read sync state {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid sync state {}", path.display()))?
        } else {
            PersistedState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileStoreInner {
                persisted,
                rooms: HashMap::new(),
            }),
        })
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, FileStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the persisted part of the state. Failures are logged; the sync
    /// keeps running on the in-memory copy.
    fn flush(&self, state: &PersistedState) {
        if let Err(e) = write_atomically(&self.path, state) {
            tracing::warn!(path = %self.path.display(), "Failed to save sync state: {:#}", e);
        }
    }
}

fn write_atomically(path: &Path, state: &PersistedState) -> Result<()> {
    let contents = serde_json::to_string_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).context("Failed to write temporary state file")?;
    std::fs::rename(&tmp, path).context("Failed to replace state file")?;
    Ok(())
}

impl Storer for FileStore {
    fn save_filter_id(&self, user_id: &str, filter_id: &str) {
        let mut inner = self.lock();
        inner
            .persisted
            .filter_ids
            .insert(user_id.to_string(), filter_id.to_string());
        self.flush(&inner.persisted);
    }

    fn load_filter_id(&self, user_id: &str) -> Option<String> {
        self.lock().persisted.filter_ids.get(user_id).cloned()
    }

    fn save_next_batch(&self, user_id: &str, next_batch: &str) {
        let mut inner = self.lock();
        inner
            .persisted
            .next_batch
            .insert(user_id.to_string(), next_batch.to_string());
        self.flush(&inner.persisted);
    }

    fn load_next_batch(&self, user_id: &str) -> Option<String> {
        self.lock().persisted.next_batch.get(user_id).cloned()
    }

    fn save_room(&self, room: &Room) {
        self.lock().rooms.insert(room.id.clone(), room.clone());
    }

    fn load_room(&self, room_id: &str) -> Option<Room> {
        self.lock().rooms.get(room_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(&dir.path().join("state.json")).unwrap();
        assert_eq!(store.load_next_batch("@me:x"), None);
        assert_eq!(store.load_filter_id("@me:x"), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn tokens_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let store = FileStore::open(&path).unwrap();
            store.save_filter_id("@me:x", "f1");
            store.save_next_batch("@me:x", "s1");
            store.save_next_batch("@me:x", "s2");
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.load_filter_id("@me:x").as_deref(), Some("f1"));
        assert_eq!(reopened.load_next_batch("@me:x").as_deref(), Some("s2"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn rooms_are_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::open(&path).unwrap();
        store.save_room(&Room::new("!r:x"));
        store.save_next_batch("@me:x", "s1");
        assert!(store.load_room("!r:x").is_some());

        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.load_room("!r:x").is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid sync state"));
    }

    #[test]
    fn unwritable_location_keeps_in_memory_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("state.json");
        let store = FileStore::open(&path).unwrap();

        store.save_next_batch("@me:x", "s1");

        assert_eq!(store.load_next_batch("@me:x").as_deref(), Some("s1"));
        assert!(!path.exists());
    }
}
