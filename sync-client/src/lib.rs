//! # roomsync-client
//!
//! Client library for syncing with a chat homeserver.
//!
//! This is the crate applications use: it runs the long-poll sync loop and
//! feeds every batch into the room state and listeners from `roomsync-core`.
//!
//! ## Features
//!
//! - **Resumable sync loop**: stream position and filter ID persisted through a [`Storer`](roomsync_core::Storer)
//! - **Single live loop**: starting or stopping supersedes any running loop
//! - **Pluggable policy**: the [`Syncer`] trait decides processing and retry behaviour
//! - **Transport abstraction**: [`HttpTransport`] for real servers, [`MockTransport`] for tests
//!
//! ## Example
//!
//! ```ignore
//! use roomsync_client::{Client, ClientConfig, DefaultSyncer};
//! use roomsync_core::MemoryStore;
//!
//! let config = ClientConfig::from_file("roomsync.toml".as_ref())?;
//! let store = Arc::new(MemoryStore::new());
//! let mut syncer = DefaultSyncer::new(&config.user_id, store.clone());
//! syncer.on_event_type("m.room.message", |event| {
//!     println!("{}: {}", event.sender, event.body().unwrap_or_default());
//! });
//!
//! let client = Client::from_config(&config, store, syncer)?;
//! client.start_sync().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod syncer;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::{ClientConfig, ConfigError, DEFAULT_PREFIX};
pub use syncer::{DefaultSyncer, FailedSync, Syncer, DEFAULT_BACKOFF, DEFAULT_TIMELINE_LIMIT};
pub use transport::{
    request_timeout, HttpError, HttpTransport, MockTransport, RegisterOutcome, Transport,
    TransportError, REQUEST_TIMEOUT_MARGIN,
};
