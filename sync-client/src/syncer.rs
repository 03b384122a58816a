//! Sync response handling policy.
//!
//! A [`Syncer`] decides what happens to each `/sync` response, how long to
//! wait after a failed request, and which filter to upload. [`DefaultSyncer`]
//! reconciles responses into the store and notifies listeners.

use std::sync::Arc;
use std::time::Duration;

use roomsync_core::{Reconciler, Storer};
use roomsync_types::{Event, SyncResponse};
use serde_json::json;

use crate::client::ClientError;
use crate::transport::TransportError;

/// Backoff [`DefaultSyncer`] applies after every failed request.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Timeline events per room requested by [`DefaultSyncer`]'s filter.
pub const DEFAULT_TIMELINE_LIMIT: u32 = 50;

/// A failed `/sync` request, as seen by [`Syncer::on_failed_sync`].
#[derive(Debug)]
pub struct FailedSync<'a> {
    /// The stream position that was requested (empty for an initial sync).
    pub since: &'a str,
    /// Consecutive failures at this position, starting at 1.
    pub attempt: u32,
    /// Why the request failed.
    pub error: &'a TransportError,
}

/// Handles sync responses and failures for [`Client::start_sync`].
///
/// [`Client::start_sync`]: crate::Client::start_sync
pub trait Syncer: Send + Sync {
    /// Process one response. `since` is the position it was requested from.
    ///
    /// An error stops the sync loop. The new position has already been saved.
    fn process_response(&self, response: SyncResponse, since: &str) -> Result<(), ClientError>;

    /// Decide what to do after a failed request.
    ///
    /// `Ok(delay)` retries the same position after `delay`; `Err` stops the
    /// sync loop with that error.
    fn on_failed_sync(&self, failure: &FailedSync<'_>) -> Result<Duration, ClientError>;

    /// Filter definition to upload the first time `user_id` syncs.
    fn filter_json(&self, user_id: &str) -> serde_json::Value;
}

/// Reconciles responses into a [`Storer`] and dispatches events to listeners.
///
/// Failed requests are retried forever with a fixed backoff.
#[derive(Debug)]
pub struct DefaultSyncer {
    reconciler: Reconciler,
    backoff: Duration,
}

impl DefaultSyncer {
    /// Create a syncer for `user_id` backed by `store`.
    pub fn new(user_id: impl Into<String>, store: Arc<dyn Storer>) -> Self {
        Self {
            reconciler: Reconciler::new(user_id, store),
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Use a different retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Register a listener for `event_type`.
    ///
    /// Listeners run inline on the sync loop, in registration order.
    pub fn on_event_type<F>(&mut self, event_type: impl Into<String>, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.reconciler.on_event_type(event_type, callback);
    }

    /// The underlying reconciler.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

impl Syncer for DefaultSyncer {
    fn process_response(&self, response: SyncResponse, since: &str) -> Result<(), ClientError> {
        Ok(self.reconciler.process(response, since)?)
    }

    fn on_failed_sync(&self, _failure: &FailedSync<'_>) -> Result<Duration, ClientError> {
        Ok(self.backoff)
    }

    fn filter_json(&self, _user_id: &str) -> serde_json::Value {
        json!({ "room": { "timeline": { "limit": DEFAULT_TIMELINE_LIMIT } } })
    }
}
