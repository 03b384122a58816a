//! Transport abstraction for roomsync.
//!
//! The sync loop only needs two things from the homeserver: the long-poll
//! `/sync` call and filter upload. [`Transport`] captures exactly that so the
//! loop can be driven by [`HttpTransport`] in production and
//! [`MockTransport`] in tests.
//!
//! # Example
//!
//! ```ignore
//! let transport = HttpTransport::new("https://example.org", "@me:example.org", token)?;
//! let filter_id = transport.create_filter("@me:example.org", &definition).await?;
//! let response = transport.sync(&SyncRequest::new(30_000, "", filter_id)).await?;
//! ```

mod http;
mod mock;

pub use http::{request_timeout, HttpTransport, RegisterOutcome, REQUEST_TIMEOUT_MARGIN};
pub use mock::MockTransport;

use async_trait::async_trait;
use roomsync_types::{ApiError, SyncRequest, SyncResponse};
use thiserror::Error;

/// A non-2xx response from the homeserver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {code}: {message}")]
pub struct HttpError {
    /// HTTP status code.
    pub code: u16,
    /// Human readable description. The protocol error message when the body
    /// decoded as one, otherwise the status line plus the raw body.
    pub message: String,
    /// Raw response body.
    pub contents: String,
    /// The decoded protocol error, if the body was one.
    pub api_error: Option<ApiError>,
}

impl HttpError {
    /// The protocol error code (`M_FORBIDDEN` etc), if any.
    pub fn errcode(&self) -> Option<&str> {
        self.api_error.as_ref().map(|e| e.code.as_str())
    }
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with an error status.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The request could not be sent or the response not read.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body was not the expected JSON.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A URL could not be built from the configured homeserver.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The transport was shut down.
    #[error("transport closed")]
    Closed,
}

/// Client-server API calls used by the sync loop.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Long-poll `/sync` once.
    ///
    /// May block for up to `request.timeout_ms` waiting for new events.
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError>;

    /// Upload a filter definition for `user_id` and return its ID.
    async fn create_filter(
        &self,
        user_id: &str,
        definition: &serde_json::Value,
    ) -> Result<String, TransportError>;
}
