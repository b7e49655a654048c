//! Error taxonomy for the HAR engine.
//!
//! A single [`EngineError`] type is returned from every library entry point.
//! Per-entry failures (a bad read, a malformed body) are carried inside the
//! stream items that reference them rather than aborting the whole
//! operation; only lifecycle misuse and initialisation failures are fatal to
//! the call that triggered them.

use thiserror::Error;

pub const MAX_ENTRY_SIZE: i64 = 100 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON at byte {offset}: {message}")]
    MalformedJson { offset: u64, message: String },

    #[error("index {index} out of range (0..{total})")]
    OutOfRange { index: usize, total: usize },

    #[error("entry size {requested} exceeds maximum allowed size {limit}")]
    OversizedEntry { requested: i64, limit: i64 },

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("streamer has not been initialised")]
    NotInitialised,

    #[error("streamer is closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to decode entry at offset {offset}: {source}")]
    Decode {
        offset: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown file offset {0}")]
    UnknownOffset(i64),
}

pub type Result<T> = std::result::Result<T, EngineError>;
