//! Search engine (C8).
//!
//! Partitions the index into contiguous batches, dispatches them to a fixed
//! worker pool, and performs metadata-first matching: the five indexed
//! metadata fields are checked before anything is read off disk, so a
//! search that only ever matches URLs or statuses never touches the file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError};

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::model::Index;
use crate::pattern::{Pattern, PatternMode};
use crate::reader::{EntryReader, ReadRequest};
use crate::streamer::Streamer;

#[derive(Clone, Copy)]
pub struct SearchOptions {
    pub mode: PatternMode,
    pub search_response_body: bool,
    pub worker_count: usize,
    pub chunk_size: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: PatternMode::Literal,
            search_response_body: false,
            worker_count: 0,
            chunk_size: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub index: usize,
    pub field: Option<String>,
    pub error: Option<crate::error::EngineError>,
}

#[derive(Default)]
pub struct SearcherStats {
    pub entries_searched: AtomicU64,
    pub matches_found: AtomicU64,
    pub bytes_searched: AtomicU64,
    pub search_duration_ns: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearcherStatsSnapshot {
    pub entries_searched: u64,
    pub matches_found: u64,
    pub bytes_searched: u64,
    pub search_duration_ns: u64,
}

impl SearcherStats {
    fn reset(&self) {
        self.entries_searched.store(0, Ordering::SeqCst);
        self.matches_found.store(0, Ordering::SeqCst);
        self.bytes_searched.store(0, Ordering::SeqCst);
        self.search_duration_ns.store(0, Ordering::SeqCst);
    }

    fn snapshot(&self) -> SearcherStatsSnapshot {
        SearcherStatsSnapshot {
            entries_searched: self.entries_searched.load(Ordering::Acquire),
            matches_found: self.matches_found.load(Ordering::Acquire),
            bytes_searched: self.bytes_searched.load(Ordering::Acquire),
            search_duration_ns: self.search_duration_ns.load(Ordering::Acquire),
        }
    }
}

pub struct Searcher {
    streamer: Arc<Streamer>,
    stats: Arc<SearcherStats>,
}

impl Searcher {
    pub fn new(streamer: Arc<Streamer>) -> Self {
        Self {
            streamer,
            stats: Arc::new(SearcherStats::default()),
        }
    }

    pub fn stats(&self) -> SearcherStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn search(&self, pattern_text: &str, options: SearchOptions, cancel: CancelToken) -> Result<SearchStream> {
        self.stats.reset();
        let pattern = Arc::new(Pattern::compile(pattern_text, options.mode)?);
        let (reader, index) = self.streamer.reader_and_index()?;

        let total = index.total_entries;
        if total == 0 {
            return Ok(SearchStream::empty());
        }

        let worker_count = if options.worker_count > 0 {
            options.worker_count
        } else {
            thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
        }
        .max(1);
        let chunk_size = if options.chunk_size > 0 {
            options.chunk_size
        } else {
            total.div_ceil(worker_count)
        }
        .max(1);

        let batches: Vec<(usize, usize)> = (0..total).step_by(chunk_size).map(|s| (s, (s + chunk_size).min(total))).collect();

        let (batch_tx, batch_rx) = crossbeam_channel::bounded::<(usize, usize)>(worker_count * 2);
        let (result_tx, result_rx) = crossbeam_channel::bounded::<Vec<SearchResult>>(worker_count * 2);

        let started = Instant::now();
        let mut handles = Vec::with_capacity(worker_count + 1);

        {
            let cancel = cancel.clone();
            handles.push(thread::spawn(move || {
                for batch in batches {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let mut payload = batch;
                    loop {
                        match batch_tx.send_timeout(payload, Duration::from_millis(50)) {
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
            }));
        }

        for _ in 0..worker_count {
            let batch_rx = batch_rx.clone();
            let result_tx = result_tx.clone();
            let reader = Arc::clone(&reader);
            let index = Arc::clone(&index);
            let pattern = Arc::clone(&pattern);
            let stats = Arc::clone(&self.stats);
            let cancel = cancel.clone();
            let search_response_body = options.search_response_body;
            handles.push(thread::spawn(move || {
                let mut scratch = Vec::with_capacity(64 * 1024);
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match batch_rx.recv_timeout(Duration::from_millis(50)) {
                        Ok((start, end)) => {
                            let mut hits = Vec::new();
                            for i in start..end {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                if let Some(result) =
                                    search_one(&reader, &index, i, &pattern, search_response_body, &mut scratch, &stats, &cancel)
                                {
                                    hits.push(result);
                                }
                            }
                            if hits.is_empty() {
                                continue;
                            }
                            let mut payload = hits;
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
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }));
        }
        drop(batch_rx);
        drop(result_tx);

        Ok(SearchStream {
            rx: result_rx,
            cancel,
            handles,
            stats: Arc::clone(&self.stats),
            started,
            current: Vec::new().into_iter(),
            closed: false,
        })
    }
}

/// Executes the metadata-first order from the module's doc comment against
/// a single entry. Returns `None` when nothing matched (including a
/// cooperative cancellation mid-scan).
fn search_one(
    reader: &EntryReader,
    index: &Index,
    i: usize,
    pattern: &Pattern,
    search_response_body: bool,
    scratch: &mut Vec<u8>,
    stats: &SearcherStats,
    cancel: &CancelToken,
) -> Option<SearchResult> {
    stats.entries_searched.fetch_add(1, Ordering::Relaxed);
    let meta = &index.entries[i];

    let metadata_hit = [
        ("url", meta.url.as_ref()),
        ("method", meta.method.as_ref()),
        ("status_text", meta.status_text.as_ref()),
        ("mime_type", meta.mime_type.as_ref()),
        ("server_ip", meta.server_ip.as_ref()),
    ]
    .into_iter()
    .find(|(_, value)| pattern.matches(value));

    if let Some((field, _)) = metadata_hit {
        stats.matches_found.fetch_add(1, Ordering::Relaxed);
        return Some(SearchResult {
            index: i,
            field: Some(field.to_string()),
            error: None,
        });
    }

    if cancel.is_cancelled() {
        return None;
    }

    let response = reader.read(
        ReadRequest {
            offset: meta.file_offset,
            length: meta.length,
            scratch: Some(scratch),
        },
        cancel,
    );
    stats.bytes_searched.fetch_add(response.bytes_read, Ordering::Relaxed);

    let entry = match response.entry {
        Some(entry) => entry,
        None => {
            return Some(SearchResult {
                index: i,
                field: None,
                error: response.error,
            });
        }
    };

    for header in &entry.request.headers {
        if pattern.matches(&header.name) || pattern.matches(&header.value) {
            stats.matches_found.fetch_add(1, Ordering::Relaxed);
            return Some(SearchResult {
                index: i,
                field: Some(format!("request.headers.{}", header.name)),
                error: None,
            });
        }
    }
    if let Some(body) = &entry.request.body {
        if !body.text.is_empty() && pattern.matches(&body.text) {
            stats.matches_found.fetch_add(1, Ordering::Relaxed);
            return Some(SearchResult {
                index: i,
                field: Some("request.body".to_string()),
                error: None,
            });
        }
    }
    for header in &entry.response.headers {
        if pattern.matches(&header.name) || pattern.matches(&header.value) {
            stats.matches_found.fetch_add(1, Ordering::Relaxed);
            return Some(SearchResult {
                index: i,
                field: Some(format!("response.headers.{}", header.name)),
                error: None,
            });
        }
    }
    if search_response_body {
        if let Some(body) = &entry.response.body {
            if !body.text.is_empty() && pattern.matches(&body.text) {
                stats.matches_found.fetch_add(1, Ordering::Relaxed);
                return Some(SearchResult {
                    index: i,
                    field: Some("response.body".to_string()),
                    error: None,
                });
            }
        }
    }

    None
}

/// A finite stream of search-result batches. Each item is the ascending-by-
/// index hit vector produced by one worker's batch; batch order across the
/// stream is unspecified. Finishing iteration (or dropping the stream
/// early) joins every worker and stamps `search_duration_ns`.
pub struct SearchStream {
    rx: crossbeam_channel::Receiver<Vec<SearchResult>>,
    cancel: CancelToken,
    handles: Vec<thread::JoinHandle<()>>,
    stats: Arc<SearcherStats>,
    started: Instant,
    current: std::vec::IntoIter<SearchResult>,
    closed: bool,
}

impl SearchStream {
    fn empty() -> Self {
        let (_tx, rx) = crossbeam_channel::bounded(0);
        Self {
            rx,
            cancel: CancelToken::new(),
            handles: Vec::new(),
            stats: Arc::new(SearcherStats::default()),
            started: Instant::now(),
            current: Vec::new().into_iter(),
            closed: true,
        }
    }

    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.stats.search_duration_ns.store(self.started.elapsed().as_nanos() as u64, Ordering::Release);
    }
}

impl Iterator for SearchStream {
    type Item = SearchResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.current.next() {
                return Some(result);
            }
            match self.rx.recv() {
                Ok(batch) => self.current = batch.into_iter(),
                Err(_) => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}

impl Drop for SearchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::StreamerOptions;
    use std::io::Write;

    fn sample_har() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"log":{{"version":"1.2","creator":{{"name":"t","version":"1"}},"entries":[
                {{"startedDateTime":"2024-01-01T00:00:00Z","time":1.0,
                  "request":{{"method":"GET","url":"https://a.test/users/1","bodySize":0,
                              "headers":[{{"name":"X-Needle","value":"nope"}}]}},
                  "response":{{"status":200,"statusText":"OK","bodySize":10,"content":{{"size":10,"mimeType":"text/plain"}}}}}},
                {{"startedDateTime":"2024-01-01T00:00:01Z","time":2.0,
                  "request":{{"method":"POST","url":"https://a.test/orders/2","bodySize":5,
                              "headers":[{{"name":"X-Trace","value":"needle-in-header"}}]}},
                  "response":{{"status":201,"statusText":"Created","bodySize":0,"content":{{"size":0,"mimeType":"application/json"}}}}}}
            ]}}}}"#
        )
        .unwrap();
        f
    }

    #[test]
    fn metadata_hit_never_touches_disk() {
        let file = sample_har();
        let streamer = Arc::new(Streamer::new(file.path(), StreamerOptions::default()));
        streamer.initialise(&CancelToken::new(), None).unwrap();
        let searcher = Searcher::new(streamer);

        let results: Vec<_> = searcher.search("users", SearchOptions::default(), CancelToken::new()).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 0);
        assert_eq!(results[0].field.as_deref(), Some("url"));
        assert_eq!(searcher.stats().bytes_searched, 0);
    }

    #[test]
    fn header_hit_requires_a_body_load() {
        let file = sample_har();
        let streamer = Arc::new(Streamer::new(file.path(), StreamerOptions::default()));
        streamer.initialise(&CancelToken::new(), None).unwrap();
        let searcher = Searcher::new(streamer);

        let results: Vec<_> = searcher.search("needle-in-header", SearchOptions::default(), CancelToken::new()).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 1);
        assert_eq!(results[0].field.as_deref(), Some("request.headers.X-Trace"));
        assert!(searcher.stats().bytes_searched > 0);
    }

    #[test]
    fn empty_index_returns_an_immediately_closed_stream() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"log":{{"version":"1.2","creator":{{"name":"t","version":"1"}},"entries":[]}}}}"#).unwrap();
        let streamer = Arc::new(Streamer::new(f.path(), StreamerOptions::default()));
        streamer.initialise(&CancelToken::new(), None).unwrap();
        let searcher = Searcher::new(streamer);

        let results: Vec<_> = searcher.search("anything", SearchOptions::default(), CancelToken::new()).unwrap().collect();
        assert!(results.is_empty());
    }

    #[test]
    fn invalid_pattern_is_rejected_before_any_worker_starts() {
        let file = sample_har();
        let streamer = Arc::new(Streamer::new(file.path(), StreamerOptions::default()));
        streamer.initialise(&CancelToken::new(), None).unwrap();
        let searcher = Searcher::new(streamer);

        let options = SearchOptions {
            mode: PatternMode::Regex,
            ..SearchOptions::default()
        };
        let err = searcher.search("(unclosed", options, CancelToken::new()).unwrap_err();
        assert!(matches!(err, crate::error::EngineError::InvalidPattern(_)));
    }
}
