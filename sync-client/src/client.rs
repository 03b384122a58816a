//! Client - the main interface for roomsync.
//!
//! [`Client`] owns the long-poll sync loop. Each iteration fetches one batch
//! through the [`Transport`], persists the new stream position, and hands
//! the response to the [`Syncer`].
//!
//! ```text
//! Application → Client → Transport → Homeserver
//!                  ↓
//!               Syncer → roomsync-core (reconcile, listeners, store)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use roomsync_client::{Client, DefaultSyncer, HttpTransport};
//! use roomsync_core::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut syncer = DefaultSyncer::new("@bot:example.org", store.clone());
//! syncer.on_event_type("m.room.message", |event| println!("{:?}", event.body()));
//!
//! let transport = HttpTransport::new("https://example.org", "@bot:example.org", token)?;
//! let client = Arc::new(Client::new("@bot:example.org", transport, store, syncer));
//! tokio::spawn({
//!     let client = client.clone();
//!     async move { client.start_sync().await }
//! });
//! ```

use std::sync::Arc;

use roomsync_core::{ReconcileError, Storer, SyncGeneration};
use roomsync_types::SyncRequest;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::syncer::{FailedSync, Syncer};
use crate::transport::{HttpTransport, Transport, TransportError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The sync filter could not be uploaded.
    #[error("failed to create sync filter: {0}")]
    FilterCreation(#[source] TransportError),

    /// A sync response could not be processed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// The failure policy gave up.
    #[error("sync aborted: {0}")]
    Aborted(String),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A sync client for one user.
///
/// `Client` is `Send + Sync`; share it through an `Arc` to call
/// [`stop_sync`](Self::stop_sync) from another task while
/// [`start_sync`](Self::start_sync) is running.
pub struct Client<T> {
    user_id: String,
    transport: T,
    store: Arc<dyn Storer>,
    syncer: Box<dyn Syncer>,
    generation: SyncGeneration,
    sync_timeout_ms: u64,
}

impl<T: Transport> Client<T> {
    /// Create a client syncing as `user_id`.
    pub fn new(
        user_id: impl Into<String>,
        transport: T,
        store: Arc<dyn Storer>,
        syncer: impl Syncer + 'static,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            transport,
            store,
            syncer: Box::new(syncer),
            generation: SyncGeneration::new(),
            sync_timeout_ms: 30_000,
        }
    }

    /// Set how long the server may hold each `/sync` request open.
    pub fn with_sync_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.sync_timeout_ms = timeout_ms;
        self
    }

    /// Sync until stopped or a fatal error occurs.
    ///
    /// Resumes from the stored stream position, uploading a filter first if
    /// none is stored for the user. Returns `Ok(())` once this loop has been
    /// superseded by [`stop_sync`](Self::stop_sync) or another `start_sync`.
    /// Superseding is only noticed after an in-flight request completes.
    ///
    /// # Errors
    ///
    /// - [`ClientError::FilterCreation`] if the filter upload fails
    /// - whatever [`Syncer::on_failed_sync`] returns to give up
    /// - whatever [`Syncer::process_response`] returns; the position of the
    ///   failing batch has already been saved, so a restart skips it
    pub async fn start_sync(&self) -> Result<(), ClientError> {
        let generation = self.generation.advance();
        let user_id = self.user_id.as_str();

        let mut since = self.store.load_next_batch(user_id).unwrap_or_default();
        let filter_id = match self.store.load_filter_id(user_id) {
            Some(filter_id) => filter_id,
            None => {
                let definition = self.syncer.filter_json(user_id);
                let filter_id = self
                    .transport
                    .create_filter(user_id, &definition)
                    .await
                    .map_err(|e| {
                        error!(user_id, error = %e, "failed to create sync filter");
                        ClientError::FilterCreation(e)
                    })?;
                self.store.save_filter_id(user_id, &filter_id);
                filter_id
            }
        };

        info!(user_id, generation, since = %since, filter_id = %filter_id, "sync started");

        let mut attempt = 0u32;
        loop {
            let request = SyncRequest::new(self.sync_timeout_ms, since.as_str(), filter_id.as_str());
            let response = match self.transport.sync(&request).await {
                Ok(response) => response,
                Err(e) => {
                    attempt += 1;
                    let failure = FailedSync {
                        since: &since,
                        attempt,
                        error: &e,
                    };
                    let backoff = self.syncer.on_failed_sync(&failure).map_err(|fatal| {
                        error!(user_id, since = %since, attempt, error = %e, reason = %fatal, "sync failed, giving up");
                        fatal
                    })?;
                    warn!(user_id, since = %since, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "sync failed, retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            if !self.generation.is_current(generation) {
                info!(user_id, generation, "sync superseded");
                return Ok(());
            }

            self.store.save_next_batch(user_id, &response.next_batch);
            let next_batch = response.next_batch.clone();
            debug!(
                user_id,
                since = %since,
                next_batch = %next_batch,
                joined = response.rooms.join.len(),
                invited = response.rooms.invite.len(),
                left = response.rooms.leave.len(),
                "processing sync batch"
            );

            if let Err(e) = self.syncer.process_response(response, &since) {
                error!(user_id, since = %since, error = %e, "failed to process sync response");
                return Err(e);
            }

            since = next_batch;
            attempt = 0;
        }
    }

    /// Stop the running sync loop, if any.
    ///
    /// Does not wait; the loop exits after its in-flight request completes,
    /// without saving or processing that response. Safe to call repeatedly.
    pub fn stop_sync(&self) {
        let generation = self.generation.advance();
        info!(user_id = %self.user_id, generation, "sync stop requested");
    }

    /// The syncing user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The store.
    pub fn store(&self) -> &Arc<dyn Storer> {
        &self.store
    }

    /// The syncer.
    pub fn syncer(&self) -> &dyn Syncer {
        self.syncer.as_ref()
    }

    /// Long-poll timeout for `/sync`, in milliseconds.
    pub fn sync_timeout_ms(&self) -> u64 {
        self.sync_timeout_ms
    }
}

impl Client<HttpTransport> {
    /// Create an HTTP client from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the configuration is invalid.
    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn Storer>,
        syncer: impl Syncer + 'static,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(config.user_id.clone(), transport, store, syncer)
            .with_sync_timeout_ms(config.sync_timeout_ms))
    }
}

impl<T> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("user_id", &self.user_id)
            .field("generation", &self.generation.current())
            .field("sync_timeout_ms", &self.sync_timeout_ms)
            .finish_non_exhaustive()
    }
}
