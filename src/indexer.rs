//! Single-pass HAR indexer (C3).
//!
//! Walks the source file exactly once, through the [`crate::tokenizer`],
//! extracting only the metadata fields the [`crate::streamer`] and
//! [`crate::search`] layers need, never materialising request or response
//! bodies.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use tracing::{debug, info};
use xxhash_rust::xxh3::Xxh3;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result};
use crate::interner::StringInterner;
use crate::model::{Browser, Creator, EntryMetadata, Index, PageSummary};
use crate::tokenizer::{JsonNumber, Token, Tokenizer};

/// Emitted at entry granularity while indexing, when a progress channel was
/// supplied to [`Indexer::run`].
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub bytes_read: u64,
    pub total_bytes: u64,
    pub entries_so_far: usize,
}

/// Wraps a reader with a rolling, non-cryptographic 64-bit hash over every
/// byte consumed, so the indexer can fingerprint the file in the same pass
/// that scans it.
struct HashingReader<R: Read> {
    inner: R,
    hasher: Xxh3,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Xxh3::new(),
        }
    }

    fn finish(&self) -> u64 {
        self.hasher.digest()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

fn zero_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("epoch timestamp is always valid")
}

pub struct Indexer {
    path: PathBuf,
}

impl Indexer {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Runs the single linear pass, producing a fully built [`Index`] or a
    /// fatal error. The `progress` sender, if given, is closed on every
    /// exit path simply by going out of scope.
    pub fn run(&self, progress: Option<Sender<ProgressUpdate>>, cancel: &CancelToken) -> Result<Index> {
        let started = Instant::now();
        info!(path = %self.path.display(), "indexing HAR file");

        let file = File::open(&self.path)?;
        let file_size = file.metadata()?.len();
        let mut hashing = HashingReader::new(BufReader::new(file));
        let interner = StringInterner::new();

        let built = self.scan(&mut hashing, file_size, &interner, &progress, cancel);
        drop(progress);

        let (entries, offset_index, version, creator, browser, pages, total_request_bytes, total_response_bytes, unique_urls, time_range) = built?;

        let index = Index {
            file_path: self.path.clone(),
            file_size,
            file_hash: hashing.finish(),
            version,
            creator,
            browser,
            pages,
            total_entries: entries.len(),
            unique_urls,
            total_request_bytes,
            total_response_bytes,
            time_range,
            build_time_ms: started.elapsed().as_millis() as u64,
            entries,
            offset_index,
        };

        info!(entries = index.total_entries, ms = index.build_time_ms, "indexing complete");
        Ok(index)
    }

    #[allow(clippy::type_complexity)]
    fn scan<R: Read>(
        &self,
        reader: &mut R,
        file_size: u64,
        interner: &StringInterner,
        progress: &Option<Sender<ProgressUpdate>>,
        cancel: &CancelToken,
    ) -> Result<(
        Vec<EntryMetadata>,
        HashMap<i64, usize>,
        Option<String>,
        Option<Creator>,
        Option<Browser>,
        Vec<PageSummary>,
        u64,
        u64,
        usize,
        (DateTime<Utc>, DateTime<Utc>),
    )> {
        let mut tok = Tokenizer::new(reader);

        let mut version = None;
        let mut creator = None;
        let mut browser = None;
        let mut pages = Vec::new();
        let mut entries = Vec::new();
        let mut offset_index = HashMap::new();
        let mut unique_urls: HashSet<Arc<str>> = HashSet::new();
        let mut total_request_bytes: u64 = 0;
        let mut total_response_bytes: u64 = 0;
        let mut time_min: Option<DateTime<Utc>> = None;
        let mut time_max: Option<DateTime<Utc>> = None;
        let mut entries_seen = false;

        expect(&mut tok, Token::ObjectStart)?;
        loop {
            match next_or_eof(&mut tok)? {
                Token::ObjectEnd => break,
                Token::String(key) if key == "log" => {
                    expect(&mut tok, Token::ObjectStart)?;
                    loop {
                        match next_or_eof(&mut tok)? {
                            Token::ObjectEnd => break,
                            Token::String(k) => match k.as_str() {
                                "version" => version = Some(expect_string(&mut tok)?),
                                "creator" => creator = Some(parse_name_version::<Creator>(&mut tok)?),
                                "browser" => browser = Some(parse_name_version::<Browser>(&mut tok)?),
                                "pages" => pages = parse_pages(&mut tok)?,
                                "entries" => {
                                    entries_seen = true;
                                    expect(&mut tok, Token::ArrayStart)?;
                                    loop {
                                        if cancel.is_cancelled() {
                                            return Err(EngineError::Cancelled);
                                        }
                                        let start_offset = tok.offset()? as i64;
                                        let first = next_or_eof(&mut tok)?;
                                        if first == Token::ArrayEnd {
                                            break;
                                        }
                                        if first != Token::ObjectStart {
                                            return Err(EngineError::MalformedJson {
                                                offset: start_offset as u64,
                                                message: "expected an entry object".into(),
                                            });
                                        }
                                        let (raw, end_offset) = parse_entry_fields(&mut tok)?;
                                        let meta = raw.into_metadata(interner, start_offset, end_offset - start_offset);

                                        total_request_bytes += meta.request_size.max(0) as u64;
                                        total_response_bytes += meta.response_size.max(0) as u64;
                                        unique_urls.insert(Arc::clone(&meta.url));
                                        if meta.timestamp != zero_time() {
                                            time_min = Some(time_min.map_or(meta.timestamp, |t| t.min(meta.timestamp)));
                                            time_max = Some(time_max.map_or(meta.timestamp, |t| t.max(meta.timestamp)));
                                        }

                                        offset_index.insert(meta.file_offset, entries.len());
                                        entries.push(meta);

                                        if let Some(tx) = progress {
                                            let _ = tx.send(ProgressUpdate {
                                                bytes_read: end_offset as u64,
                                                total_bytes: file_size,
                                                entries_so_far: entries.len(),
                                            });
                                        }
                                    }
                                    debug!(count = entries.len(), "entries array scanned");
                                }
                                _ => tok.skip_value_noalloc()?,
                            },
                            other => return Err(unexpected_key(tok.raw_offset(), other)),
                        }
                    }
                }
                Token::String(_other) => tok.skip_value_noalloc()?,
                other => return Err(unexpected_key(tok.raw_offset(), other)),
            }
        }

        if !entries_seen {
            return Err(EngineError::MalformedJson {
                offset: 0,
                message: "log.entries key is missing".into(),
            });
        }

        let time_range = (time_min.unwrap_or_else(zero_time), time_max.unwrap_or_else(zero_time));
        Ok((
            entries,
            offset_index,
            version,
            creator,
            browser,
            pages,
            total_request_bytes,
            total_response_bytes,
            unique_urls.len(),
            time_range,
        ))
    }
}

/// Raw, not-yet-interned fields collected while walking one entry object.
#[derive(Default)]
struct RawEntry {
    timestamp: DateTime<Utc>,
    duration_ms: f64,
    method: String,
    url: String,
    request_size: i64,
    status_code: i32,
    status_text: String,
    response_size: i64,
    mime_type: String,
    body_size: i64,
    page_ref: String,
    server_ip: String,
    connection: String,
}

impl RawEntry {
    fn into_metadata(self, interner: &StringInterner, file_offset: i64, length: i64) -> EntryMetadata {
        EntryMetadata {
            file_offset,
            length,
            method: interner.intern(&self.method),
            url: interner.intern(&self.url),
            status_code: self.status_code,
            status_text: interner.intern(&self.status_text),
            mime_type: interner.intern(&self.mime_type),
            page_ref: interner.intern(&self.page_ref),
            server_ip: interner.intern(&self.server_ip),
            connection: interner.intern(&self.connection),
            timestamp: self.timestamp,
            duration_ms: self.duration_ms,
            request_size: self.request_size,
            response_size: self.response_size,
            body_size: self.body_size,
        }
    }
}

fn parse_entry_fields<R: Read>(tok: &mut Tokenizer<R>) -> Result<(RawEntry, i64)> {
    let mut raw = RawEntry {
        timestamp: zero_time(),
        ..Default::default()
    };

    loop {
        match next_or_eof(tok)? {
            Token::ObjectEnd => {
                return Ok((raw, tok.raw_offset() as i64));
            }
            Token::String(key) => match key.as_str() {
                "startedDateTime" => {
                    let s = expect_string(tok)?;
                    raw.timestamp = DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| zero_time());
                }
                "time" => raw.duration_ms = expect_number(tok)?.as_f64(),
                "request" => parse_request(tok, &mut raw)?,
                "response" => parse_response(tok, &mut raw)?,
                "pageref" => raw.page_ref = expect_string(tok)?,
                "serverIPAddress" => raw.server_ip = expect_string(tok)?,
                "connection" => raw.connection = expect_flexible_string(tok)?,
                _ => tok.skip_value_noalloc()?,
            },
            other => return Err(unexpected_key(tok.raw_offset(), other)),
        }
    }
}

fn parse_request<R: Read>(tok: &mut Tokenizer<R>, raw: &mut RawEntry) -> Result<()> {
    expect(tok, Token::ObjectStart)?;
    loop {
        match next_or_eof(tok)? {
            Token::ObjectEnd => return Ok(()),
            Token::String(key) => match key.as_str() {
                "method" => raw.method = expect_string(tok)?,
                "url" => raw.url = expect_string(tok)?,
                "bodySize" => raw.request_size = expect_number(tok)?.as_i64(),
                _ => tok.skip_value_noalloc()?,
            },
            other => return Err(unexpected_key(tok.raw_offset(), other)),
        }
    }
}

fn parse_response<R: Read>(tok: &mut Tokenizer<R>, raw: &mut RawEntry) -> Result<()> {
    expect(tok, Token::ObjectStart)?;
    loop {
        match next_or_eof(tok)? {
            Token::ObjectEnd => return Ok(()),
            Token::String(key) => match key.as_str() {
                "status" => raw.status_code = expect_number(tok)?.as_i32(),
                "statusText" => raw.status_text = expect_string(tok)?,
                "bodySize" => raw.response_size = expect_number(tok)?.as_i64(),
                "content" => parse_content(tok, raw)?,
                _ => tok.skip_value_noalloc()?,
            },
            other => return Err(unexpected_key(tok.raw_offset(), other)),
        }
    }
}

fn parse_content<R: Read>(tok: &mut Tokenizer<R>, raw: &mut RawEntry) -> Result<()> {
    expect(tok, Token::ObjectStart)?;
    loop {
        match next_or_eof(tok)? {
            Token::ObjectEnd => return Ok(()),
            Token::String(key) => match key.as_str() {
                "size" => raw.body_size = expect_number(tok)?.as_i64(),
                "mimeType" => raw.mime_type = expect_string(tok)?,
                // text/encoding may carry multi-megabyte base64 payloads;
                // discard without allocating.
                _ => tok.skip_value_noalloc()?,
            },
            other => return Err(unexpected_key(tok.raw_offset(), other)),
        }
    }
}

fn parse_name_version<T: Default + NameVersion>(tok: &mut Tokenizer<impl Read>) -> Result<T> {
    let mut out = T::default();
    expect(tok, Token::ObjectStart)?;
    loop {
        match next_or_eof(tok)? {
            Token::ObjectEnd => return Ok(out),
            Token::String(key) => match key.as_str() {
                "name" => out.set_name(expect_string(tok)?),
                "version" => out.set_version(expect_string(tok)?),
                _ => tok.skip_value_noalloc()?,
            },
            other => return Err(unexpected_key(tok.raw_offset(), other)),
        }
    }
}

trait NameVersion {
    fn set_name(&mut self, v: String);
    fn set_version(&mut self, v: String);
}

impl NameVersion for Creator {
    fn set_name(&mut self, v: String) {
        self.name = Some(v);
    }
    fn set_version(&mut self, v: String) {
        self.version = Some(v);
    }
}

impl NameVersion for Browser {
    fn set_name(&mut self, v: String) {
        self.name = Some(v);
    }
    fn set_version(&mut self, v: String) {
        self.version = Some(v);
    }
}

fn parse_pages<R: Read>(tok: &mut Tokenizer<R>) -> Result<Vec<PageSummary>> {
    expect(tok, Token::ArrayStart)?;
    let mut pages = Vec::new();
    loop {
        match next_or_eof(tok)? {
            Token::ArrayEnd => return Ok(pages),
            Token::ObjectStart => {
                let mut page = PageSummary {
                    started_date_time: zero_time(),
                    ..Default::default()
                };
                loop {
                    match next_or_eof(tok)? {
                        Token::ObjectEnd => break,
                        Token::String(key) => match key.as_str() {
                            "id" => page.id = expect_string(tok)?,
                            "title" => page.title = expect_string(tok)?,
                            "startedDateTime" => {
                                let s = expect_string(tok)?;
                                page.started_date_time =
                                    DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| zero_time());
                            }
                            _ => tok.skip_value_noalloc()?,
                        },
                        other => return Err(unexpected_key(tok.raw_offset(), other)),
                    }
                }
                pages.push(page);
            }
            other => return Err(unexpected_key(tok.raw_offset(), other)),
        }
    }
}

fn expect(tok: &mut Tokenizer<impl Read>, want: Token) -> Result<()> {
    let got = next_or_eof(tok)?;
    if got == want {
        Ok(())
    } else {
        Err(EngineError::MalformedJson {
            offset: tok.raw_offset(),
            message: format!("expected {want:?}, found {got:?}"),
        })
    }
}

fn expect_string(tok: &mut Tokenizer<impl Read>) -> Result<String> {
    match next_or_eof(tok)? {
        Token::String(s) => Ok(s),
        other => Err(unexpected_key(tok.raw_offset(), other)),
    }
}

fn expect_number(tok: &mut Tokenizer<impl Read>) -> Result<JsonNumber> {
    match next_or_eof(tok)? {
        Token::Number(n) => Ok(n),
        other => Err(unexpected_key(tok.raw_offset(), other)),
    }
}

/// `connection` is a string in HAR 1.2 but some producers emit a number.
fn expect_flexible_string(tok: &mut Tokenizer<impl Read>) -> Result<String> {
    match next_or_eof(tok)? {
        Token::String(s) => Ok(s),
        Token::Number(n) => Ok(n.as_i64().to_string()),
        Token::ObjectStart => {
            tok.skip_value(Token::ObjectStart)?;
            Ok(String::new())
        }
        Token::ArrayStart => {
            tok.skip_value(Token::ArrayStart)?;
            Ok(String::new())
        }
        _ => Ok(String::new()),
    }
}

fn next_or_eof(tok: &mut Tokenizer<impl Read>) -> Result<Token> {
    tok.next_token()?.ok_or_else(|| EngineError::MalformedJson {
        offset: tok.raw_offset(),
        message: "unexpected end of input".into(),
    })
}

fn unexpected_key(offset: u64, token: Token) -> EngineError {
    EngineError::MalformedJson {
        offset,
        message: format!("unexpected token {token:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn index_fixture(contents: &str) -> Result<Index> {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        Indexer::new(f.path()).run(None, &CancelToken::new())
    }

    #[test]
    fn empty_entries_array_is_a_valid_zero_entry_index() {
        let index = index_fixture(r#"{"log":{"version":"1.2","creator":{"name":"t","version":"1"},"entries":[]}}"#).unwrap();
        assert_eq!(index.total_entries, 0);
        assert_eq!(index.unique_urls, 0);
        assert_eq!(index.time_range.0, index.time_range.1);
        assert_ne!(index.file_hash, 0);
    }

    #[test]
    fn missing_entries_key_is_fatal() {
        let err = index_fixture(r#"{"log":{"version":"1.2","creator":{"name":"t","version":"1"}}}"#).unwrap_err();
        assert!(matches!(err, EngineError::MalformedJson { .. }));
    }

    #[test]
    fn entries_are_captured_in_ascending_file_offset_order() {
        let index = index_fixture(
            r#"{"log":{"version":"1.2","creator":{"name":"t","version":"1"},"entries":[
                {"startedDateTime":"2024-01-01T00:00:00Z","time":1.0,
                 "request":{"method":"GET","url":"https://a.test/1","bodySize":0},
                 "response":{"status":200,"statusText":"OK","bodySize":3,"content":{"size":3,"mimeType":"text/plain"}}},
                {"startedDateTime":"2024-01-01T00:00:01Z","time":2.0,
                 "request":{"method":"POST","url":"https://a.test/2","bodySize":7},
                 "response":{"status":404,"statusText":"Not Found","bodySize":0,"content":{"size":0,"mimeType":"text/plain"}}}
            ]}}"#,
        )
        .unwrap();

        assert_eq!(index.total_entries, 2);
        assert_eq!(index.unique_urls, 2);
        assert!(index.entries[0].file_offset < index.entries[1].file_offset);
        for entry in &index.entries {
            assert!(entry.file_offset >= 0);
            assert!(entry.file_offset + entry.length <= index.file_size as i64);
        }
        assert_eq!(index.entries[0].method.as_ref(), "GET");
        assert_eq!(index.entries[1].status_code, 404);
        assert_eq!(index.total_request_bytes, 7);
        assert_eq!(index.total_response_bytes, 3);
    }

    #[test]
    fn offset_index_resolves_back_to_the_same_metadata() {
        let index = index_fixture(
            r#"{"log":{"version":"1.2","creator":{"name":"t","version":"1"},"entries":[
                {"startedDateTime":"2024-01-01T00:00:00Z","time":1.0,
                 "request":{"method":"GET","url":"https://a.test/1","bodySize":0},
                 "response":{"status":200,"statusText":"OK","bodySize":0,"content":{"size":0,"mimeType":"text/plain"}}}
            ]}}"#,
        )
        .unwrap();
        let meta = &index.entries[0];
        assert_eq!(index.metadata_at_offset(meta.file_offset).unwrap().file_offset, meta.file_offset);
    }

    #[test]
    fn flexible_connection_field_accepts_numbers() {
        let index = index_fixture(
            r#"{"log":{"version":"1.2","creator":{"name":"t","version":"1"},"entries":[
                {"startedDateTime":"2024-01-01T00:00:00Z","time":1.0,"connection":12345,
                 "request":{"method":"GET","url":"https://a.test/1","bodySize":0},
                 "response":{"status":200,"statusText":"OK","bodySize":0,"content":{"size":0,"mimeType":"text/plain"}}}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(index.entries[0].connection.as_ref(), "12345");
    }
}
