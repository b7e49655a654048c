// Clippy: deny unwrap_used in production code — use expect() or ? instead
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! Constant-memory random access and parallel full-text search over
//! HTTP-Archive (HAR) capture files.
//!
//! The entry point is [`open`], which constructs a [`Streamer`] against a
//! file path. Call [`Streamer::initialise`] to run the indexer, then use
//! [`Streamer::get`]/[`range`](Streamer::range)/[`filter`](Streamer::filter)
//! for random access, or wrap the streamer in a [`Searcher`] for full-text
//! search.

pub mod cancel;
pub mod error;
pub mod generator;
pub mod indexer;
pub mod interner;
pub mod model;
pub mod pattern;
pub mod pool;
pub mod reader;
pub mod search;
pub mod streamer;
pub mod tokenizer;

use std::path::Path;

pub use cancel::CancelToken;
pub use error::{EngineError, Result};
pub use model::{CacheState, Creator, Browser, Entry, EntryMetadata, Header, Index, PageSummary, QueryParam, Request, Response};
pub use pattern::{Pattern, PatternMode};
pub use search::{SearchOptions, SearchResult, SearchStream, Searcher, SearcherStatsSnapshot};
pub use streamer::{EntryStream, Streamer, StreamerOptions, StreamerStatsSnapshot};

/// Constructs a [`Streamer`] for the HAR file at `path`. The streamer is
/// returned in the Constructed state; call `initialise` before any other
/// operation.
pub fn open(path: impl AsRef<Path>, options: StreamerOptions) -> Streamer {
    Streamer::new(path, options)
}
