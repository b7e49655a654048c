//! Data model shared by the indexer, streamer, and search engine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-entry metadata captured during indexing. Fixed cost regardless of
/// how large the entry's body is, since bodies are never retained here.
#[derive(Debug, Clone, Serialize)]
pub struct EntryMetadata {
    pub file_offset: i64,
    pub length: i64,
    pub method: Arc<str>,
    pub url: Arc<str>,
    pub status_code: i32,
    pub status_text: Arc<str>,
    pub mime_type: Arc<str>,
    pub page_ref: Arc<str>,
    pub server_ip: Arc<str>,
    pub connection: Arc<str>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: f64,
    pub request_size: i64,
    pub response_size: i64,
    pub body_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Creator {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Browser {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub started_date_time: DateTime<Utc>,
}

/// The in-memory table of per-entry metadata and file-wide aggregates
/// produced by a single linear scan of the source file. Immutable once
/// constructed; owned exclusively by the [`crate::streamer::Streamer`] that
/// built it.
#[derive(Serialize)]
pub struct Index {
    pub file_path: PathBuf,
    pub file_size: u64,
    pub file_hash: u64,
    pub version: Option<String>,
    pub creator: Option<Creator>,
    pub browser: Option<Browser>,
    pub pages: Vec<PageSummary>,
    pub entries: Vec<EntryMetadata>,
    pub total_entries: usize,
    pub unique_urls: usize,
    pub total_request_bytes: u64,
    pub total_response_bytes: u64,
    pub time_range: (DateTime<Utc>, DateTime<Utc>),
    pub build_time_ms: u64,
    #[serde(skip)]
    pub offset_index: HashMap<i64, usize>,
}

impl Index {
    /// O(1) metadata lookup by the entry's on-disk byte offset.
    pub fn metadata_at_offset(&self, offset: i64) -> Option<&EntryMetadata> {
        self.offset_index.get(&offset).map(|&i| &self.entries[i])
    }
}

/// A single request or response header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// One `request.queryString` entry: a parsed `key=value` pair lifted out of
/// the URL, as HAR stores it redundantly alongside the raw `url` string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub http_version: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, rename = "queryString")]
    pub query_params: Vec<QueryParam>,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default, rename = "postData")]
    pub body: Option<RequestBody>,
    #[serde(default)]
    pub headers_size: i64,
    #[serde(default)]
    pub body_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status: i32,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub http_version: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default, rename = "content")]
    pub body: Option<ResponseBody>,
    #[serde(default)]
    pub headers_size: i64,
    #[serde(default)]
    pub body_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
    pub blocked: Option<f64>,
    pub dns: Option<f64>,
    pub connect: Option<f64>,
    pub ssl: Option<f64>,
}

/// One half of a HAR `cache` entry (`beforeRequest`/`afterRequest`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryState {
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub last_access: String,
    #[serde(default)]
    pub e_tag: String,
    #[serde(default)]
    pub hit_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheState {
    #[serde(default)]
    pub before_request: Option<CacheEntryState>,
    #[serde(default)]
    pub after_request: Option<CacheEntryState>,
}

/// The full decoded form of a HAR entry. Instantiated on demand by
/// [`crate::reader::EntryReader`]; never cached by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default)]
    pub started_date_time: String,
    #[serde(default)]
    pub time: f64,
    pub request: Request,
    pub response: Response,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub cache: CacheState,
    #[serde(default)]
    pub server_ip_address: Option<String>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub pageref: Option<String>,
}
