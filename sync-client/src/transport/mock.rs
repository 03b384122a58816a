//! Mock transport for testing.
//!
//! Sync replies are scripted in call order. A reply can be ready up front or
//! gated behind a oneshot channel so a test can hold a request "in flight"
//! while it does something else (start a second loop, stop syncing).

use super::{Transport, TransportError};
use async_trait::async_trait;
use roomsync_types::{SyncRequest, SyncResponse};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type SyncResult = Result<SyncResponse, TransportError>;

#[derive(Debug)]
enum Reply {
    Ready(SyncResult),
    Gated(oneshot::Receiver<SyncResult>),
}

/// Mock transport for testing.
///
/// Requests are recorded for verification. When the reply queue is empty a
/// `sync()` call never completes, unless the transport was closed with
/// [`close`](Self::close).
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    replies: VecDeque<Reply>,
    sync_requests: Vec<SyncRequest>,
    filter_requests: Vec<(String, serde_json::Value)>,
    fail_next_create_filter: Option<TransportError>,
    closed: bool,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful `sync()` reply.
    pub fn queue_response(&self, response: SyncResponse) {
        let mut inner = self.inner.lock().unwrap();
        inner.replies.push_back(Reply::Ready(Ok(response)));
    }

    /// Queue a failed `sync()` reply.
    pub fn queue_error(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.replies.push_back(Reply::Ready(Err(error)));
    }

    /// Queue a `sync()` reply that completes when the returned sender fires.
    ///
    /// Dropping the sender completes the call with [`TransportError::Closed`].
    pub fn queue_gated(&self) -> oneshot::Sender<SyncResult> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().unwrap();
        inner.replies.push_back(Reply::Gated(rx));
        tx
    }

    /// Cause the next `create_filter()` to fail with the given error.
    pub fn fail_next_create_filter(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_create_filter = Some(error);
    }

    /// Make every `sync()` call with no queued reply fail with
    /// [`TransportError::Closed`] instead of pending.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
    }

    /// All `sync()` requests received, in order.
    pub fn sync_requests(&self) -> Vec<SyncRequest> {
        let inner = self.inner.lock().unwrap();
        inner.sync_requests.clone()
    }

    /// Number of `sync()` calls received.
    pub fn sync_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.sync_requests.len()
    }

    /// All `create_filter()` calls received, as `(user_id, definition)`.
    pub fn filter_requests(&self) -> Vec<(String, serde_json::Value)> {
        let inner = self.inner.lock().unwrap();
        inner.filter_requests.clone()
    }

    /// Number of queued replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.replies.len()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let (reply, closed) = {
            let mut inner = self.inner.lock().unwrap();
            inner.sync_requests.push(request.clone());
            (inner.replies.pop_front(), inner.closed)
        };

        match reply {
            Some(Reply::Ready(result)) => result,
            Some(Reply::Gated(rx)) => rx.await.unwrap_or(Err(TransportError::Closed)),
            None if closed => Err(TransportError::Closed),
            None => std::future::pending().await,
        }
    }

    async fn create_filter(
        &self,
        user_id: &str,
        definition: &serde_json::Value,
    ) -> Result<String, TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_create_filter.take() {
            return Err(error);
        }

        inner
            .filter_requests
            .push((user_id.to_string(), definition.clone()));
        Ok(format!("filter-{}", inner.filter_requests.len()))
    }
}
