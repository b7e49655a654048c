//! File-handle pool (C4).
//!
//! Gives every concurrent reader task its own seekable [`File`] handle so
//! that seeks from one task never race with another's. The pool is
//! lock-free on the fast path: a handle, once acquired, is owned
//! exclusively by its caller until released.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

struct PoolState {
    free: Vec<File>,
    total_created: usize,
    closed: bool,
}

/// A pool of independently seekable handles onto a single source file.
pub struct HandlePool {
    path: PathBuf,
    state: Mutex<PoolState>,
}

impl HandlePool {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Mutex::new(PoolState {
                free: Vec::new(),
                total_created: 0,
                closed: false,
            }),
        }
    }

    /// Returns a ready-to-use handle, reusing a released one if available,
    /// otherwise lazily opening a new OS handle.
    pub fn acquire(&self) -> Result<File> {
        let mut state = self.state.lock().expect("handle pool mutex poisoned");
        if let Some(file) = state.free.pop() {
            return Ok(file);
        }
        let file = File::open(&self.path)?;
        state.total_created += 1;
        Ok(file)
    }

    /// Returns a handle to the pool for reuse. A handle released after
    /// `close()` is simply dropped rather than leaked.
    pub fn release(&self, file: File) {
        let mut state = self.state.lock().expect("handle pool mutex poisoned");
        if state.closed {
            drop(file);
        } else {
            state.free.push(file);
        }
    }

    /// Closes every handle currently sitting in the pool and marks the pool
    /// closed so future releases are dropped instead of retained. Safe to
    /// call more than once.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("handle pool mutex poisoned");
        state.closed = true;
        state.free.clear();
    }

    pub fn total_created(&self) -> usize {
        self.state.lock().expect("handle pool mutex poisoned").total_created
    }
}
