//! Streamer façade (C6).
//!
//! Owns the [`Index`], the [`EntryReader`], and a statistics block, and is
//! the one object external callers (the CLI, the search engine) actually
//! hold. Moves through an explicit lifecycle: Constructed → Initialised →
//! Closed. Every operation before `initialise()` returns `NotInitialised`;
//! every operation after `close()` returns `Closed`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, SendTimeoutError};

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::indexer::{Indexer, ProgressUpdate};
use crate::model::{Entry, EntryMetadata, Index};
use crate::pool::HandlePool;
use crate::reader::{EntryReader, ReadRequest};

#[derive(Clone, Copy)]
pub struct StreamerOptions {
    /// Workers used by `range`/`filter`; 0 selects the number of logical
    /// CPUs.
    pub worker_count: usize,
}

impl Default for StreamerOptions {
    fn default() -> Self {
        Self { worker_count: 0 }
    }
}

#[derive(Default)]
pub struct StreamerStats {
    pub total_reads: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub bytes_read: AtomicU64,
    pub entries_parsed: AtomicU64,
    pub parse_errors: AtomicU64,
    pub total_read_time_ns: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamerStatsSnapshot {
    pub total_reads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bytes_read: u64,
    pub entries_parsed: u64,
    pub parse_errors: u64,
    pub total_read_time_ns: u64,
    pub average_read_time_ns: u64,
}

impl StreamerStats {
    fn snapshot(&self) -> StreamerStatsSnapshot {
        let total_reads = self.total_reads.load(Ordering::Acquire);
        let total_read_time_ns = self.total_read_time_ns.load(Ordering::Acquire);
        StreamerStatsSnapshot {
            total_reads,
            cache_hits: self.cache_hits.load(Ordering::Acquire),
            cache_misses: self.cache_misses.load(Ordering::Acquire),
            bytes_read: self.bytes_read.load(Ordering::Acquire),
            entries_parsed: self.entries_parsed.load(Ordering::Acquire),
            parse_errors: self.parse_errors.load(Ordering::Acquire),
            total_read_time_ns,
            average_read_time_ns: total_read_time_ns / total_reads.max(1),
        }
    }
}

/// The resources that exist only once the Streamer has been initialised.
/// `cache_reserved` is the no-op entry-cache slot: present from
/// construction, never `Option`, so there is exactly one lifecycle to
/// reason about (see DESIGN.md for the alternative this rejects).
struct Inner {
    index: Arc<Index>,
    reader: Arc<EntryReader>,
    pool: Arc<HandlePool>,
    #[allow(dead_code)]
    cache_reserved: (),
}

pub struct Streamer {
    path: PathBuf,
    options: StreamerOptions,
    inner: OnceLock<Inner>,
    closed: AtomicBool,
    stats: Arc<StreamerStats>,
}

impl Streamer {
    pub fn new(path: impl AsRef<Path>, options: StreamerOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
            inner: OnceLock::new(),
            closed: AtomicBool::new(false),
            stats: Arc::new(StreamerStats::default()),
        }
    }

    fn require_inner(&self) -> Result<&Inner> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        self.inner.get().ok_or(EngineError::NotInitialised)
    }

    fn effective_worker_count(&self) -> usize {
        if self.options.worker_count > 0 {
            self.options.worker_count
        } else {
            thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
        }
    }

    /// Opens the file, runs the indexer to completion, and constructs the
    /// reader. Idempotent: calling twice on an already-initialised streamer
    /// is a no-op.
    pub fn initialise(&self, cancel: &CancelToken, progress: Option<Sender<ProgressUpdate>>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        if self.inner.get().is_some() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let index = Indexer::new(&self.path).run(progress, cancel)?;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let index = Arc::new(index);
        let pool = Arc::new(HandlePool::new(&self.path));
        let reader = Arc::new(EntryReader::new(Arc::clone(&pool), Arc::clone(&index)));

        let _ = self.inner.set(Inner {
            index,
            reader,
            pool,
            cache_reserved: (),
        });
        Ok(())
    }

    pub fn get(&self, i: usize, cancel: &CancelToken) -> Result<Entry> {
        let inner = self.require_inner()?;
        get_entry(&inner.reader, &inner.index, i, &self.stats, cancel)
    }

    pub fn metadata(&self, i: usize) -> Result<EntryMetadata> {
        let inner = self.require_inner()?;
        inner.index.entries.get(i).cloned().ok_or(EngineError::OutOfRange {
            index: i,
            total: inner.index.total_entries,
        })
    }

    pub fn index(&self) -> Result<&Index> {
        Ok(&self.require_inner()?.index)
    }

    /// Exposes the shared reader and index to the search engine, which
    /// needs direct reader access (for pooled scratch buffers) rather than
    /// going through `get`.
    pub(crate) fn reader_and_index(&self) -> Result<(Arc<EntryReader>, Arc<Index>)> {
        let inner = self.require_inner()?;
        Ok((Arc::clone(&inner.reader), Arc::clone(&inner.index)))
    }

    pub fn stats(&self) -> StreamerStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn range(&self, start: usize, end: usize, cancel: CancelToken) -> Result<EntryStream> {
        let inner = self.require_inner()?;
        let total = inner.index.total_entries;
        if start > end || end > total {
            return Err(EngineError::OutOfRange { index: end, total });
        }
        Ok(self.stream_indices(inner, (start..end).collect(), cancel))
    }

    pub fn filter(&self, pred: impl Fn(&EntryMetadata) -> bool, cancel: CancelToken) -> Result<EntryStream> {
        let inner = self.require_inner()?;
        let indices: Vec<usize> = inner
            .index
            .entries
            .iter()
            .enumerate()
            .filter(|(_, m)| pred(m))
            .map(|(i, _)| i)
            .collect();
        Ok(self.stream_indices(inner, indices, cancel))
    }

    fn stream_indices(&self, inner: &Inner, indices: Vec<usize>, cancel: CancelToken) -> EntryStream {
        let worker_count = self.effective_worker_count().max(1);
        let (work_tx, work_rx) = crossbeam_channel::bounded::<usize>(worker_count * 4);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<(usize, Result<Entry>)>(worker_count * 4);

        let mut handles = Vec::with_capacity(worker_count + 1);

        {
            let cancel = cancel.clone();
            handles.push(thread::spawn(move || {
                for i in indices {
                    if cancel.is_cancelled() {
                        break;
                    }
                    loop {
                        match work_tx.send_timeout(i, Duration::from_millis(50)) {
                            Ok(()) => break,
                            Err(SendTimeoutError::Timeout(_)) => {
                                if cancel.is_cancelled() {
                                    return;
                                }
                            }
                            Err(SendTimeoutError::Disconnected(_)) => return,
                        }
                    }
                }
            }));
        }

        for _ in 0..worker_count {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let reader = Arc::clone(&inner.reader);
            let index = Arc::clone(&inner.index);
            let stats = Arc::clone(&self.stats);
            let cancel = cancel.clone();
            handles.push(thread::spawn(move || loop {
                if cancel.is_cancelled() {
                    break;
                }
                match work_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(i) => {
                        let mut payload = (i, get_entry(&reader, &index, i, &stats, &cancel));
                        loop {
                            match result_tx.send_timeout(payload, Duration::from_millis(50)) {
                                Ok(()) => break,
                                Err(SendTimeoutError::Timeout(v)) => {
                                    if cancel.is_cancelled() {
                                        return;
                                    }
                                    payload = v;
                                }
                                Err(SendTimeoutError::Disconnected(_)) => return,
                            }
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }));
        }
        drop(work_rx);
        drop(result_tx);

        EntryStream {
            rx: result_rx,
            cancel,
            handles,
        }
    }

    /// Closes the handle pool and moves the streamer into the terminal
    /// `Closed` state. Safe to call more than once.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(inner) = self.inner.get() {
            inner.pool.close();
        }
    }
}

fn get_entry(reader: &EntryReader, index: &Index, i: usize, stats: &StreamerStats, cancel: &CancelToken) -> Result<Entry> {
    let total = index.total_entries;
    let meta = index.entries.get(i).ok_or(EngineError::OutOfRange { index: i, total })?;

    let started = Instant::now();
    let response = reader.read(
        ReadRequest {
            offset: meta.file_offset,
            length: meta.length,
            scratch: None,
        },
        cancel,
    );

    stats.total_reads.fetch_add(1, Ordering::Relaxed);
    stats.bytes_read.fetch_add(response.bytes_read, Ordering::Relaxed);
    stats.total_read_time_ns.fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);

    match response.entry {
        Some(entry) => {
            stats.entries_parsed.fetch_add(1, Ordering::Relaxed);
            Ok(entry)
        }
        None => {
            stats.parse_errors.fetch_add(1, Ordering::Relaxed);
            Err(response.error.unwrap_or(EngineError::Cancelled))
        }
    }
}

/// A finite, non-restartable stream of `(index, Entry | Err)` pairs backed
/// by a fixed worker pool. Dropping the stream before it is exhausted
/// cancels and joins every worker so no task is ever leaked.
pub struct EntryStream {
    rx: crossbeam_channel::Receiver<(usize, Result<Entry>)>,
    cancel: CancelToken,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Iterator for EntryStream {
    type Item = (usize, Result<Entry>);

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

impl Drop for EntryStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
