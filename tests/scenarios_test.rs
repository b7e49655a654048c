//! End-to-end scenario tests exercising the indexer, streamer, and search
//! engine together against generated HAR fixtures.

use std::sync::Arc;

use har_engine::cancel::CancelToken;
use har_engine::error::EngineError;
use har_engine::generator::{write_har_file, GeneratorOptions, InjectField, Injection};
use har_engine::pattern::PatternMode;
use har_engine::search::{SearchOptions, Searcher};
use har_engine::streamer::{Streamer, StreamerOptions};

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn index_empty_entries_har() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "empty.har", r#"{"log":{"version":"1.2","creator":{"name":"t","version":"1"},"entries":[]}}"#);

    let streamer = Streamer::new(&path, StreamerOptions::default());
    streamer.initialise(&CancelToken::new(), None).unwrap();
    let index = streamer.index().unwrap();

    assert_eq!(index.total_entries, 0);
    assert_ne!(index.file_hash, 0);
    assert_eq!(index.time_range.0, index.time_range.1);

    let searcher = Searcher::new(Arc::new(streamer));
    let results: Vec<_> = searcher.search("anything", SearchOptions::default(), CancelToken::new()).unwrap().collect();
    assert!(results.is_empty());
}

#[test]
fn metadata_only_search_never_touches_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.har");
    write_har_file(
        &path,
        &GeneratorOptions {
            entry_count: 99,
            injections: vec![Injection {
                term: "metafast".to_string(),
                field: InjectField::Url,
            }],
        },
    )
    .unwrap();

    let streamer = Arc::new(Streamer::new(&path, StreamerOptions::default()));
    streamer.initialise(&CancelToken::new(), None).unwrap();
    let searcher = Searcher::new(streamer);

    let results: Vec<_> = searcher.search("metafast", SearchOptions::default(), CancelToken::new()).unwrap().collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].field.as_deref(), Some("url"));

    let stats = searcher.stats();
    assert_eq!(stats.bytes_searched, 0);
    assert_eq!(stats.entries_searched, 100);
}

#[test]
fn deep_search_toggle_finds_response_body_only_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deep.har");
    write_har_file(
        &path,
        &GeneratorOptions {
            entry_count: 20,
            injections: vec![Injection {
                term: "deepterm".to_string(),
                field: InjectField::ResponseBody,
            }],
        },
    )
    .unwrap();

    let streamer = Arc::new(Streamer::new(&path, StreamerOptions::default()));
    streamer.initialise(&CancelToken::new(), None).unwrap();
    let searcher = Searcher::new(streamer);

    let shallow: Vec<_> = searcher.search("deepterm", SearchOptions::default(), CancelToken::new()).unwrap().collect();
    assert!(shallow.is_empty());

    let deep_options = SearchOptions {
        search_response_body: true,
        ..SearchOptions::default()
    };
    let deep: Vec<_> = searcher.search("deepterm", deep_options, CancelToken::new()).unwrap().collect();
    assert_eq!(deep.len(), 1);
    assert_eq!(deep[0].field.as_deref(), Some("response.body"));
    assert!(searcher.stats().bytes_searched > 0);
}

#[test]
fn regex_scan_matches_every_injected_variant() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("regex.har");
    write_har_file(
        &path,
        &GeneratorOptions {
            entry_count: 15,
            injections: vec!["api123", "api456", "api789"]
                .into_iter()
                .map(|term| Injection {
                    term: term.to_string(),
                    field: InjectField::Url,
                })
                .collect(),
        },
    )
    .unwrap();

    let streamer = Arc::new(Streamer::new(&path, StreamerOptions::default()));
    streamer.initialise(&CancelToken::new(), None).unwrap();
    let searcher = Searcher::new(streamer);

    let options = SearchOptions {
        mode: PatternMode::Regex,
        ..SearchOptions::default()
    };
    let results: Vec<_> = searcher.search(r"api\d+", options, CancelToken::new()).unwrap().collect();
    assert_eq!(results.len(), 3);

    let err = searcher.search("[invalid(", options, CancelToken::new()).unwrap_err();
    assert!(matches!(err, EngineError::InvalidPattern(_)));
}

#[test]
fn oversize_request_is_rejected_without_growing_the_scratch_buffer() {
    use har_engine::error::MAX_ENTRY_SIZE;
    use har_engine::reader::{EntryReader, ReadRequest};
    use har_engine::pool::HandlePool;

    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "oversize.har", r#"{"log":{"version":"1.2","creator":{"name":"t","version":"1"},"entries":[]}}"#);

    let index = Arc::new(har_engine::model::Index {
        file_path: path.clone(),
        file_size: 0,
        file_hash: 0,
        version: None,
        creator: None,
        browser: None,
        pages: Vec::new(),
        entries: Vec::new(),
        total_entries: 0,
        unique_urls: 0,
        total_request_bytes: 0,
        total_response_bytes: 0,
        time_range: (chrono::DateTime::<chrono::Utc>::MIN_UTC, chrono::DateTime::<chrono::Utc>::MIN_UTC),
        build_time_ms: 0,
        offset_index: Default::default(),
    });
    let reader = EntryReader::new(Arc::new(HandlePool::new(&path)), index);

    let mut scratch = Vec::new();
    let response = reader.read(
        ReadRequest {
            offset: 0,
            length: MAX_ENTRY_SIZE + 1,
            scratch: Some(&mut scratch),
        },
        &CancelToken::new(),
    );

    assert!(scratch.is_empty());
    let message = response.error.unwrap().to_string();
    assert!(message.contains(&(MAX_ENTRY_SIZE + 1).to_string()));
    assert!(message.contains(&MAX_ENTRY_SIZE.to_string()));
}

#[test]
fn cancelling_a_range_stream_bounds_entries_searched_and_leaks_no_threads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cancel.har");
    write_har_file(&path, &GeneratorOptions { entry_count: 500, injections: Vec::new() }).unwrap();

    let streamer = Streamer::new(&path, StreamerOptions { worker_count: 4 });
    streamer.initialise(&CancelToken::new(), None).unwrap();
    let total = streamer.index().unwrap().total_entries;

    let cancel = CancelToken::new();
    let stream = streamer.range(0, total, cancel.clone()).unwrap();
    cancel.cancel();
    let seen: Vec<_> = stream.collect();
    assert!(seen.len() <= total);
}
