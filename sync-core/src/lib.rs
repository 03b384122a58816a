//! # roomsync-core
//!
//! Pure logic for roomsync (no network I/O, instant tests).
//!
//! This crate holds everything the sync loop needs that does not touch the
//! network:
//! - [`Room`] - the per-room current-state table
//! - [`ListenerRegistry`] - event-type keyed callbacks
//! - [`Storer`] - the persistence port, plus [`MemoryStore`]
//! - [`Reconciler`] - turns one sync response into state updates and
//!   listener notifications
//! - [`SyncGeneration`] - identifies the one live sync loop
//!
//! The actual I/O (long-polling the homeserver) is performed by
//! `roomsync-client`, which feeds responses into these types.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod generation;
pub mod listeners;
pub mod reconcile;
pub mod room;
pub mod store;

pub use generation::SyncGeneration;
pub use listeners::{Listener, ListenerRegistry};
pub use reconcile::{suppress_rejoined_rooms, ReconcileError, Reconciler};
pub use room::{Room, RoomError};
pub use store::{MemoryStore, Storer};
