// Clippy: deny unwrap_used in production code — use expect() or ? instead
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

//! har-engine - random access and search over HTTP Archive captures
//!
//! Indexes a HAR file in a single linear pass, then offers constant-memory
//! random access and parallel full-text search without ever materialising
//! the whole file in memory.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_env("HAR_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    cli::run(cli)
}
