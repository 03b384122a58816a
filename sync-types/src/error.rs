//! Error types for roomsync wire types.

use thiserror::Error;

/// Errors raised while interpreting protocol payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON (de)serialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event content did not have the expected shape
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// Filter contains an unsupported value
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// An event content field was missing or had the wrong JSON type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// Field is absent from the content map
    #[error("missing content field '{field}'")]
    Missing {
        /// Name of the missing field.
        field: String,
    },

    /// Field is present but holds a different JSON type
    #[error("content field '{field}' is not a {expected}")]
    WrongType {
        /// Name of the offending field.
        field: String,
        /// The JSON type the caller asked for.
        expected: &'static str,
    },
}
