//! Entry reader (C5).
//!
//! Seeks to a recorded byte range, decodes it into a full [`Entry`], and
//! returns the handle to the pool it borrowed it from. The scratch-buffer
//! path avoids a fresh allocation per read for hot callers (the search
//! engine); the direct path trades that for simplicity when a caller reads
//! once and discards.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::{EngineError, Result, MAX_ENTRY_SIZE};
use crate::model::{Entry, EntryMetadata, Index};
use crate::pool::HandlePool;

pub struct ReadRequest<'a> {
    pub offset: i64,
    pub length: i64,
    pub scratch: Option<&'a mut Vec<u8>>,
}

#[derive(Default)]
pub struct ReadResponse {
    pub entry: Option<Entry>,
    pub bytes_read: u64,
    pub error: Option<EngineError>,
}

impl ReadResponse {
    fn failed(error: EngineError) -> Self {
        Self {
            entry: None,
            bytes_read: 0,
            error: Some(error),
        }
    }
}

pub struct EntryReader {
    pool: Arc<HandlePool>,
    index: Arc<Index>,
}

impl EntryReader {
    pub fn new(pool: Arc<HandlePool>, index: Arc<Index>) -> Self {
        Self { pool, index }
    }

    /// O(1) lookup of an entry's metadata by its on-disk byte offset.
    pub fn read_metadata(&self, offset: i64) -> Result<EntryMetadata> {
        self.index.metadata_at_offset(offset).cloned().ok_or(EngineError::UnknownOffset(offset))
    }

    pub fn read(&self, request: ReadRequest<'_>, cancel: &CancelToken) -> ReadResponse {
        if cancel.is_cancelled() {
            return ReadResponse::failed(EngineError::Cancelled);
        }
        if request.length > MAX_ENTRY_SIZE {
            return ReadResponse::failed(EngineError::OversizedEntry {
                requested: request.length,
                limit: MAX_ENTRY_SIZE,
            });
        }

        let mut handle = match self.pool.acquire() {
            Ok(h) => h,
            Err(e) => return ReadResponse::failed(e),
        };

        let response = self.read_with_handle(&mut handle, request, cancel);
        self.pool.release(handle);
        response
    }

    fn read_with_handle(&self, handle: &mut File, request: ReadRequest<'_>, cancel: &CancelToken) -> ReadResponse {
        if let Err(e) = handle.seek(SeekFrom::Start(request.offset as u64)) {
            return ReadResponse::failed(e.into());
        }
        if cancel.is_cancelled() {
            return ReadResponse::failed(EngineError::Cancelled);
        }

        match request.scratch {
            Some(scratch) => read_via_scratch(handle, request.offset, request.length, scratch),
            None => read_direct(handle, request.offset, request.length),
        }
    }
}

fn read_via_scratch(handle: &mut File, offset: i64, length: i64, scratch: &mut Vec<u8>) -> ReadResponse {
    let length_usize = length as usize;
    scratch.clear();
    scratch.resize(length_usize, 0);

    let mut limited = handle.take(length as u64);
    let n = match read_fully_tolerant(&mut limited, scratch) {
        Ok(n) => n,
        Err(e) => return ReadResponse::failed(e.into()),
    };
    scratch.truncate(n);

    let start = skip_leading_noise(scratch);
    match serde_json::from_slice::<Entry>(&scratch[start..]) {
        Ok(entry) => ReadResponse {
            entry: Some(entry),
            bytes_read: n as u64,
            error: None,
        },
        Err(source) => ReadResponse {
            entry: None,
            bytes_read: n as u64,
            error: Some(EngineError::Decode { offset, source }),
        },
    }
}

fn read_direct(handle: &mut File, offset: i64, length: i64) -> ReadResponse {
    let limited = handle.take(length as u64);
    let mut counting = CountingRead::new(NoiseSkippingRead::new(limited));
    match serde_json::from_reader::<_, Entry>(&mut counting) {
        Ok(entry) => ReadResponse {
            entry: Some(entry),
            bytes_read: counting.count,
            error: None,
        },
        Err(source) => ReadResponse {
            entry: None,
            bytes_read: counting.count,
            error: Some(EngineError::Decode { offset, source }),
        },
    }
}

fn read_fully_tolerant<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn skip_leading_noise(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|&&b| matches!(b, b',' | b' ' | b'\t' | b'\n' | b'\r')).count()
}

/// Strips the same leading noise as [`skip_leading_noise`], but from a
/// stream rather than a slice, for the no-scratch-buffer read path.
struct NoiseSkippingRead<R: Read> {
    inner: R,
    skipped: bool,
}

impl<R: Read> NoiseSkippingRead<R> {
    fn new(inner: R) -> Self {
        Self { inner, skipped: false }
    }
}

impl<R: Read> Read for NoiseSkippingRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if !self.skipped {
            self.skipped = true;
            let mut one = [0u8; 1];
            loop {
                match self.inner.read(&mut one)? {
                    0 => return Ok(0),
                    _ if matches!(one[0], b',' | b' ' | b'\t' | b'\n' | b'\r') => continue,
                    _ => break,
                }
            }
            if buf.is_empty() {
                return Ok(0);
            }
            buf[0] = one[0];
            let rest = self.inner.read(&mut buf[1..])?;
            return Ok(1 + rest);
        }
        self.inner.read(buf)
    }
}

struct CountingRead<R: Read> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingRead<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for CountingRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
