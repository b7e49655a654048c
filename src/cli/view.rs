//! `view` subcommand: index a HAR file and print a plain-text summary.
//!
//! Not an interactive table — that TUI is out of scope; this prints what a
//! caller needs to confirm the file indexed correctly.

use anyhow::Result;
use std::path::Path;

use har_engine::{CancelToken, Streamer, StreamerOptions};

pub fn run(path: &Path, workers: usize) -> Result<()> {
    let streamer = Streamer::new(path, StreamerOptions { worker_count: workers });
    streamer.initialise(&CancelToken::new(), None)?;
    let index = streamer.index()?;

    println!("file:            {}", index.file_path.display());
    println!("size:            {} bytes", index.file_size);
    println!("entries:         {}", index.total_entries);
    println!("unique urls:     {}", index.unique_urls);
    println!("request bytes:   {}", index.total_request_bytes);
    println!("response bytes:  {}", index.total_response_bytes);
    println!("time range:      {} .. {}", index.time_range.0, index.time_range.1);
    println!("indexed in:      {} ms", index.build_time_ms);

    streamer.close();
    Ok(())
}
