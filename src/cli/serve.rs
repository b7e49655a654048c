//! `serve` subcommand: initialise a Streamer, then idle until interrupted.
//!
//! There is no replay server behind this command (out of scope, see
//! SPEC_FULL.md §1) — it exists so the binary has a long-running mode to
//! demonstrate the Streamer's lifecycle and so `--port` has somewhere to be
//! validated.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use har_engine::{CancelToken, Streamer, StreamerOptions};

pub fn run(path: &Path, port: u16, workers: usize) -> Result<()> {
    let streamer = Streamer::new(path, StreamerOptions { worker_count: workers });
    streamer.initialise(&CancelToken::new(), None)?;
    info!(entries = streamer.index()?.total_entries, port, "streamer initialised, idling on signals");

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(wait_for_shutdown_signal())?;

    info!("shutdown signal received, closing streamer");
    streamer.close();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
