//! Synthetic HAR generator (C9).
//!
//! Produces syntactically valid HAR 1.2 documents with filler entries and
//! search terms injected at deterministic locations, so property tests can
//! assert exact match counts and exact fields rather than guessing at
//! fixture content. Used both by the `generate` CLI subcommand and by the
//! integration test suite.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// Names the metadata or body field an [`Injection`] lands its term in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectField {
    Url,
    Method,
    StatusText,
    MimeType,
    ServerIp,
    RequestHeader,
    RequestBody,
    ResponseHeader,
    ResponseBody,
}

impl InjectField {
    pub fn parse(s: &str) -> Option<InjectField> {
        match s {
            "url" => Some(InjectField::Url),
            "method" => Some(InjectField::Method),
            "status_text" => Some(InjectField::StatusText),
            "mime_type" => Some(InjectField::MimeType),
            "server_ip" => Some(InjectField::ServerIp),
            "request_header" => Some(InjectField::RequestHeader),
            "request_body" => Some(InjectField::RequestBody),
            "response_header" => Some(InjectField::ResponseHeader),
            "response_body" => Some(InjectField::ResponseBody),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Injection {
    pub term: String,
    pub field: InjectField,
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub entry_count: usize,
    pub injections: Vec<Injection>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            entry_count: 10,
            injections: Vec::new(),
        }
    }
}

/// Renders a HAR document to a `String`. Filler entries carry no
/// user-supplied terms; each [`Injection`] lands its term in exactly one
/// otherwise-filler entry at a fixed, documented index (`entry_count +
/// injection_index`), so a caller who knows `entry_count` always knows
/// exactly where each injected term landed.
pub fn generate_har(options: &GeneratorOptions) -> String {
    let mut entries = Vec::with_capacity(options.entry_count + options.injections.len());

    for i in 0..options.entry_count {
        entries.push(filler_entry(i, None, InjectField::Url));
    }
    for (j, injection) in options.injections.iter().enumerate() {
        entries.push(filler_entry(options.entry_count + j, Some(injection.term.as_str()), injection.field));
    }

    let mut out = String::new();
    out.push_str("{\"log\":{\"version\":\"1.2\",\"creator\":{\"name\":\"har-engine-generator\",\"version\":\"1\"},\"entries\":[");
    out.push_str(&entries.join(","));
    out.push_str("]}}");
    out
}

pub fn write_har_file(path: impl AsRef<Path>, options: &GeneratorOptions) -> io::Result<()> {
    let document = generate_har(options);
    let mut file = File::create(path)?;
    file.write_all(document.as_bytes())
}

/// Picks `term` when `field` matches `want`, falling back to `default`
/// otherwise. Never unwraps — `term` is `None` for every filler entry that
/// carries no injection.
fn pick(term: Option<&str>, field: InjectField, want: InjectField, default: &str) -> String {
    match term.filter(|_| field == want) {
        Some(t) => t.to_string(),
        None => default.to_string(),
    }
}

fn filler_entry(i: usize, term: Option<&str>, field: InjectField) -> String {
    let url = match term.filter(|_| field == InjectField::Url) {
        Some(t) => format!("https://example.test/{t}"),
        None => format!("https://example.test/resource/{i}"),
    };
    let method = pick(term, field, InjectField::Method, "GET");
    let status_text = pick(term, field, InjectField::StatusText, "OK");
    let mime_type = pick(term, field, InjectField::MimeType, "text/plain");
    let server_ip = pick(term, field, InjectField::ServerIp, "127.0.0.1");
    let request_header_value = pick(term, field, InjectField::RequestHeader, "filler");
    let request_body_text = pick(term, field, InjectField::RequestBody, "");
    let response_header_value = pick(term, field, InjectField::ResponseHeader, "filler");
    let response_body_text = pick(term, field, InjectField::ResponseBody, "");

    format!(
        concat!(
            "{{\"startedDateTime\":\"2024-01-01T00:00:{:02}Z\",\"time\":1.0,",
            "\"serverIPAddress\":\"{}\",",
            "\"request\":{{\"method\":\"{}\",\"url\":\"{}\",\"httpVersion\":\"HTTP/1.1\",",
            "\"headers\":[{{\"name\":\"X-Filler\",\"value\":\"{}\"}}],",
            "\"postData\":{{\"mimeType\":\"text/plain\",\"text\":\"{}\"}},\"bodySize\":0}},",
            "\"response\":{{\"status\":200,\"statusText\":\"{}\",\"httpVersion\":\"HTTP/1.1\",",
            "\"headers\":[{{\"name\":\"X-Filler\",\"value\":\"{}\"}}],",
            "\"content\":{{\"size\":0,\"mimeType\":\"{}\",\"text\":\"{}\"}},\"bodySize\":0}}}}"
        ),
        i % 60,
        escape(&server_ip),
        escape(&method),
        escape(&url),
        escape(&request_header_value),
        escape(&request_body_text),
        escape(&status_text),
        escape(&response_header_value),
        escape(&mime_type),
        escape(&response_body_text),
    )
}

/// Escapes a string for embedding in a JSON string literal. `serde_json`
/// (used by `src/reader.rs` to decode the generated fixtures back out)
/// rejects raw control bytes inside a string, so every byte below 0x20 must
/// come through as an escape, not just `\` and `"`.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::cancel::CancelToken;

    #[test]
    fn generated_document_indexes_cleanly() {
        let options = GeneratorOptions {
            entry_count: 5,
            injections: vec![
                Injection {
                    term: "needle-url".to_string(),
                    field: InjectField::Url,
                },
                Injection {
                    term: "needle-body".to_string(),
                    field: InjectField::ResponseBody,
                },
            ],
        };
        let document = generate_har(&options);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, document.as_bytes()).unwrap();

        let index = Indexer::new(file.path()).run(None, &CancelToken::new()).unwrap();
        assert_eq!(index.total_entries, 7);
        assert!(index.entries[5].url.contains("needle-url"));
    }

    #[test]
    fn write_har_file_round_trips_through_the_indexer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.har");
        let options = GeneratorOptions {
            entry_count: 3,
            injections: vec![Injection {
                term: "POST".to_string(),
                field: InjectField::Method,
            }],
        };
        write_har_file(&path, &options).unwrap();

        let index = Indexer::new(&path).run(None, &CancelToken::new()).unwrap();
        assert_eq!(index.total_entries, 4);
        assert_eq!(index.entries[3].method.as_ref(), "POST");
    }

    #[test]
    fn escape_encodes_control_bytes_not_just_backslash_and_quote() {
        assert_eq!(escape("line1\nline2"), "line1\\nline2");
        assert_eq!(escape("a\tb\rc"), "a\\tb\\rc");
        assert_eq!(escape("\u{01}"), "\\u0001");
        assert_eq!(escape(r#"back\slash and "quote""#), r#"back\\slash and \"quote\""#);
    }

    #[test]
    fn injected_control_characters_decode_cleanly_through_the_entry_reader() {
        use crate::pool::HandlePool;
        use crate::reader::{EntryReader, ReadRequest};
        use std::sync::Arc;

        let options = GeneratorOptions {
            entry_count: 2,
            injections: vec![Injection {
                term: "line1\nline2\ttabbed".to_string(),
                field: InjectField::ResponseBody,
            }],
        };
        let document = generate_har(&options);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, document.as_bytes()).unwrap();

        let index = Arc::new(Indexer::new(file.path()).run(None, &CancelToken::new()).unwrap());
        let pool = Arc::new(HandlePool::new(file.path()));
        let reader = EntryReader::new(pool, Arc::clone(&index));

        let meta = &index.entries[2];
        let response = reader.read(
            ReadRequest {
                offset: meta.file_offset,
                length: meta.length,
                scratch: None,
            },
            &CancelToken::new(),
        );
        let entry = response.entry.expect("injected control characters must still decode as valid JSON");
        assert_eq!(entry.response.body.unwrap().text, "line1\nline2\ttabbed");
    }

    #[test]
    fn pick_never_needs_to_unwrap_a_mismatched_field() {
        assert_eq!(pick(Some("x"), InjectField::Method, InjectField::Method, "default"), "x");
        assert_eq!(pick(Some("x"), InjectField::Method, InjectField::Url, "default"), "default");
        assert_eq!(pick(None, InjectField::Method, InjectField::Method, "default"), "default");
    }
}
