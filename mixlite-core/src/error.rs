//! Error types for mixlite-core

use thiserror::Error;

/// Main error type for the mixlite-core library
///
/// None of these ever reach the host through the [`crate::Client`] surface:
/// the client logs them and degrades to "ignored" or "still queued".
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error from the durable store
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backing store unavailable or refusing writes
    #[error("storage error: {0}")]
    Storage(String),

    /// HTTP request could not be completed (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered but did not accept the transaction
    #[error("rejected by endpoint ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Payload could not be encoded or decoded for transport
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Missing or blank project token
    #[error("invalid token")]
    InvalidToken,

    /// Missing or blank event name
    #[error("invalid event name")]
    InvalidEventName,

    /// Missing or blank identity
    #[error("invalid id")]
    InvalidId,

    /// Caller data was not a JSON object
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A tracking call arrived before `init`
    #[error("client not initialized, call init(token) first")]
    NotInitialized,
}

/// Result type alias for mixlite-core
pub type Result<T> = std::result::Result<T, Error>;
