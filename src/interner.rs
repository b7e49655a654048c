//! Sharded string interner.
//!
//! URLs, methods, status texts, and mime types repeat heavily across a HAR
//! capture. Interning them once and sharing an `Arc<str>` everywhere keeps
//! the in-memory [`crate::model::Index`] small without a second lookup
//! table. A single global lock would serialise every indexed entry, so the
//! table is split into 256 independently-locked shards keyed by a fixed,
//! stable hash of the string — `DefaultHasher` is seeded randomly per
//! process and would make shard assignment (and therefore test fixtures)
//! non-reproducible across runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const SHARD_COUNT: usize = 256;

fn stable_hash(s: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64(s.as_bytes())
}

/// Deduplicates strings behind shared, reference-counted slices.
pub struct StringInterner {
    shards: Vec<RwLock<HashMap<Box<str>, Arc<str>>>>,
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl StringInterner {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards }
    }

    fn shard_index(s: &str) -> usize {
        (stable_hash(s) % SHARD_COUNT as u64) as usize
    }

    /// Returns the canonical, shared copy of `s`, inserting it on first
    /// sight. The empty string is never interned and is handed back as-is.
    pub fn intern(&self, s: &str) -> Arc<str> {
        if s.is_empty() {
            return Arc::from("");
        }

        let shard = &self.shards[Self::shard_index(s)];

        if let Some(existing) = shard.read().expect("interner shard poisoned").get(s) {
            return Arc::clone(existing);
        }

        let mut guard = shard.write().expect("interner shard poisoned");
        if let Some(existing) = guard.get(s) {
            return Arc::clone(existing);
        }

        let canonical: Arc<str> = Arc::from(s);
        guard.insert(Box::from(s), Arc::clone(&canonical));
        canonical
    }

    /// Total number of distinct non-empty strings interned so far.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().expect("interner shard poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
