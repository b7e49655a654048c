//! CLI command definitions and handlers

mod generate;
mod serve;
mod view;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|_| format!("'{s}' is not a valid number"))?;
    if n > 256 {
        Err("workers cannot exceed 256".to_string())
    } else {
        Ok(n)
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    let n: u16 = s.parse().map_err(|_| format!("'{s}' is not a valid port"))?;
    if n == 0 {
        Err("port must be between 1 and 65535".to_string())
    } else {
        Ok(n)
    }
}

/// har-engine - random access and search over HTTP Archive captures
#[derive(Parser, Debug)]
#[command(name = "har-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Number of parallel workers (0 = number of logical CPUs)
    #[arg(long, global = true, default_value = "0", value_parser = parse_workers, env = "HAR_ENGINE_WORKERS")]
    pub workers: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a HAR file and print a plain-text summary
    View {
        /// Path to the HAR file
        path: PathBuf,
    },

    /// Index a HAR file and idle until interrupted
    Serve {
        /// Path to the HAR file
        path: PathBuf,

        /// Port reserved for a future replay server (not bound; validated only)
        #[arg(long, default_value = "8080", value_parser = parse_port)]
        port: u16,
    },

    /// Write a synthetic HAR file with injected search terms
    Generate {
        /// Output path for the generated HAR file
        output: PathBuf,

        /// Number of filler entries
        #[arg(long, default_value = "10")]
        entries: usize,

        /// Inject a search term into a field, as TERM=FIELD
        /// (field is one of: url, method, status_text, mime_type, server_ip,
        /// request_header, request_body, response_header, response_body)
        #[arg(long = "inject")]
        injections: Vec<String>,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::View { path } => view::run(&path, cli.workers),
        Commands::Serve { path, port } => serve::run(&path, port, cli.workers),
        Commands::Generate { output, entries, injections } => generate::run(&output, entries, &injections),
    }
}
